//! Integration tests for the export document structure.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use confsync::models::ImportConfig;
use confsync::sync::ExportOptions;
use confsync::xml::{DocumentParser, EntitiesItem, Section};
use confsync::{SqliteStore, SyncService};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn seeded_store() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.register_plugin("Platforms", "1.0.0", true).unwrap();
    let type_id = store.register_resource_type("Linux", "Platforms").unwrap();
    store
        .register_metric_definition(type_id, "cpu.idle", 60_000, true, false)
        .unwrap();
    store
        .register_metric_definition(type_id, "mem.free", 120_000, true, false)
        .unwrap();
    store
}

fn plain_options() -> ExportOptions {
    ExportOptions {
        compress: false,
        level: 6,
    }
}

fn export_plain(service: &SyncService) -> Vec<u8> {
    service.export_to_vec(&plain_options()).unwrap().data
}

// ============================================================================
// Document structure
// ============================================================================

#[test]
fn validators_precede_entities_in_first_seen_order() {
    let service = SyncService::new(seeded_store());
    let data = export_plain(&service);

    let mut parser = DocumentParser::new(data.as_slice()).unwrap();
    let mut validators = Vec::new();
    let mut entities = Vec::new();
    while let Some(section) = parser.next_section().unwrap() {
        match section {
            Section::Validator(node) => {
                assert!(
                    entities.is_empty(),
                    "validator found after an entities element"
                );
                validators.push(node.attr("id").unwrap().to_string());
            },
            Section::EntitiesStart { id } => entities.push(id),
        }
    }

    assert_eq!(validators, ["system-settings", "deployed-plugins"]);
    assert_eq!(entities, ["system-settings", "metric-templates"]);
}

#[test]
fn entities_blocks_open_with_default_configuration() {
    let service = SyncService::new(seeded_store());
    let data = export_plain(&service);

    let mut parser = DocumentParser::new(data.as_slice()).unwrap();
    while let Some(section) = parser.next_section().unwrap() {
        if let Section::EntitiesStart { id } = section {
            let first = parser
                .next_entities_item()
                .unwrap()
                .unwrap_or_else(|| panic!("entities '{id}' is empty"));
            assert!(
                matches!(first, EntitiesItem::DefaultConfiguration(_)),
                "entities '{id}' does not start with default-configuration"
            );
        }
    }
}

#[test]
fn default_configuration_excludes_server_identity_settings() {
    let service = SyncService::new(seeded_store());
    let data = export_plain(&service);

    let mut parser = DocumentParser::new(data.as_slice()).unwrap();
    while let Some(section) = parser.next_section().unwrap() {
        let Section::EntitiesStart { id } = section else {
            continue;
        };
        if id != "system-settings" {
            continue;
        }
        let Some(EntitiesItem::DefaultConfiguration(node)) =
            parser.next_entities_item().unwrap()
        else {
            panic!("missing default-configuration");
        };
        let config = ImportConfig::from_node(&node).unwrap();
        let names = config.string("propertiesToImport").unwrap();
        assert!(names.contains("ENABLE_DEBUG_MODE"));
        assert!(!names.contains("CAM_BASE_URL"));
        return;
    }
    panic!("no system-settings entities element");
}

#[test]
fn metric_templates_travel_one_per_entity() {
    let service = SyncService::new(seeded_store());
    let data = export_plain(&service);

    let mut parser = DocumentParser::new(data.as_slice()).unwrap();
    let mut templates = 0;
    while let Some(section) = parser.next_section().unwrap() {
        let Section::EntitiesStart { id } = section else {
            continue;
        };
        while let Some(item) = parser.next_entities_item().unwrap() {
            if id == "metric-templates" && matches!(item, EntitiesItem::Entity(_)) {
                templates += 1;
            }
        }
    }
    assert_eq!(templates, 2);
}

#[test]
fn empty_store_still_emits_every_entities_block() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let service = SyncService::new(store);
    let data = export_plain(&service);

    let mut parser = DocumentParser::new(data.as_slice()).unwrap();
    let mut entities = Vec::new();
    while let Some(section) = parser.next_section().unwrap() {
        if let Section::EntitiesStart { id } = section {
            entities.push(id);
        }
    }
    assert_eq!(entities, ["system-settings", "metric-templates"]);
}

// ============================================================================
// Framing and messages
// ============================================================================

#[test]
fn export_is_gzipped_by_default() {
    let service = SyncService::new(seeded_store());
    let report = service.export_to_vec(&ExportOptions::default()).unwrap();
    assert_eq!(&report.data[..2], &[0x1f, 0x8b]);
}

#[test]
fn gzipped_export_validates_after_auto_detection() {
    let service = SyncService::new(seeded_store());
    let report = service.export_to_vec(&ExportOptions::default()).unwrap();
    service.validate(report.data.as_slice(), &[]).unwrap();
}

#[test]
fn messages_report_exported_counts() {
    let service = SyncService::new(seeded_store());
    let report = service.export_to_vec(&plain_options()).unwrap();

    let settings = &report.messages["system-settings"];
    assert_eq!(settings.exported, 1);
    assert!(settings.errors.is_empty());

    let templates = &report.messages["metric-templates"];
    assert_eq!(templates.exported, 2);
    assert_eq!(
        templates.notes.as_deref(),
        Some("exported 2 metric template(s)")
    );
}
