//! Integration tests for the validation pass.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use confsync::models::ValidationReport;
use confsync::{Error, SqliteStore, SyncService};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn document(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <configuration-export>{body}</configuration-export>"
    )
}

fn service_with_plugin() -> (Arc<SqliteStore>, SyncService) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.register_plugin("Platforms", "1.0.0", true).unwrap();
    let service = SyncService::new(Arc::clone(&store));
    (store, service)
}

fn expect_validation_failure(result: Result<(), Error>) -> ValidationReport {
    match result {
        Err(Error::Validation(report)) => report,
        other => panic!("expected a validation failure, got {other:?}"),
    }
}

// ============================================================================
// Consistency validators
// ============================================================================

#[test]
fn plugin_version_mismatch_is_reported() {
    let (_, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"deployed-plugins\">\
           <plugin name=\"Platforms\" version=\"2.0.0\"/>\
         </validator>\
         <entities id=\"metric-templates\"/>",
    );

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].validator, "deployed-plugins");
    assert!(report.failures[0].message.contains("1.0.0"));
}

#[test]
fn missing_plugin_is_reported() {
    let (_, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"deployed-plugins\">\
           <plugin name=\"Unheard-Of\" version=\"1.0.0\"/>\
         </validator>\
         <entities id=\"metric-templates\"/>",
    );

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    assert!(report.failures[0].message.contains("Unheard-Of"));
}

#[test]
fn unknown_setting_name_is_reported() {
    let (_, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"system-settings\">\
           <setting name=\"NO_SUCH_SETTING\"/>\
         </validator>\
         <entities id=\"system-settings\"/>",
    );

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    assert_eq!(report.failures[0].validator, "system-settings");
    assert!(report.failures[0].message.contains("NO_SUCH_SETTING"));
}

#[test]
fn unknown_validator_is_tolerated() {
    let (_, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"system-settings\"/>\
         <validator id=\"from-a-future-release\"><whatever/></validator>\
         <entities id=\"system-settings\"/>",
    );

    service.validate(doc.as_bytes(), &[]).unwrap();
}

// ============================================================================
// Required validators
// ============================================================================

#[test]
fn missing_required_validator_is_a_failure() {
    let (_, service) = service_with_plugin();
    let doc = document("<entities id=\"metric-templates\"/>");

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].validator, "deployed-plugins");
    assert!(report.failures[0].message.contains("did not run"));
}

#[test]
fn entities_are_not_validated_when_required_validators_missed() {
    let (_, service) = service_with_plugin();
    // The sub-minimum interval would normally add a metric-interval failure;
    // with the required validator missing, only that failure is reported.
    let doc = document(
        "<entities id=\"metric-templates\">\
           <entity><data>\
             <metricTemplate metricName=\"cpu.idle\" resourceTypeName=\"Linux\"\
                             resourceTypePlugin=\"Platforms\" defaultInterval=\"1000\"\
                             enabled=\"true\" perMinute=\"false\"/>\
           </data></entity>\
         </entities>",
    );

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].validator, "deployed-plugins");
}

// ============================================================================
// Entity validators
// ============================================================================

#[test]
fn sub_minimum_interval_is_reported() {
    let (_, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"deployed-plugins\">\
           <plugin name=\"Platforms\" version=\"1.0.0\"/>\
         </validator>\
         <entities id=\"metric-templates\">\
           <entity><data>\
             <metricTemplate metricName=\"cpu.idle\" resourceTypeName=\"Linux\"\
                             resourceTypePlugin=\"Platforms\" defaultInterval=\"29999\"\
                             enabled=\"true\" perMinute=\"false\"/>\
           </data></entity>\
         </entities>",
    );

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    assert_eq!(report.failures[0].validator, "metric-interval");
    assert!(report.failures[0].message.contains("30000"));
}

#[test]
fn failures_accumulate_across_the_document() {
    let (_, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"system-settings\">\
           <setting name=\"NO_SUCH_SETTING\"/>\
         </validator>\
         <validator id=\"deployed-plugins\">\
           <plugin name=\"Platforms\" version=\"9.9.9\"/>\
         </validator>\
         <entities id=\"system-settings\"/>\
         <entities id=\"metric-templates\">\
           <entity><data>\
             <metricTemplate metricName=\"cpu.idle\" resourceTypeName=\"Linux\"\
                             resourceTypePlugin=\"Platforms\" defaultInterval=\"1000\"\
                             enabled=\"true\" perMinute=\"false\"/>\
           </data></entity>\
         </entities>",
    );

    let report = expect_validation_failure(service.validate(doc.as_bytes(), &[]));
    let validators: Vec<_> = report
        .failures
        .iter()
        .map(|f| f.validator.as_str())
        .collect();
    assert_eq!(
        validators,
        ["system-settings", "deployed-plugins", "metric-interval"]
    );
}

// ============================================================================
// Hard errors
// ============================================================================

#[test]
fn unknown_synchronizer_is_a_hard_error() {
    let (_, service) = service_with_plugin();
    let doc = document("<entities id=\"no-such-synchronizer\"/>");

    let err = service.validate(doc.as_bytes(), &[]).unwrap_err();
    assert!(matches!(err, Error::UnknownSynchronizer(ref id) if id == "no-such-synchronizer"));
}

#[test]
fn malformed_document_is_a_hard_error() {
    let (_, service) = service_with_plugin();
    let err = service
        .validate(&b"<not-an-export-document/>"[..], &[])
        .unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));
}

#[test]
fn import_never_starts_when_validation_fails() {
    let (store, service) = service_with_plugin();
    let doc = document(
        "<validator id=\"system-settings\">\
           <setting name=\"NO_SUCH_SETTING\"/>\
         </validator>\
         <entities id=\"system-settings\">\
           <entity><data>\
             <systemSettings>\
               <entry key=\"ENABLE_DEBUG_MODE\">true</entry>\
             </systemSettings>\
           </data></entity>\
         </entities>",
    );

    let err = service.import(doc.as_bytes(), &[]).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(
        store.setting("ENABLE_DEBUG_MODE").unwrap().as_deref(),
        Some("false")
    );
}
