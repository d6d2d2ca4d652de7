mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{Call, RecordingSink, Script, profile};
use db_builder::prelude::*;

fn manifest() -> Manifest {
    Manifest::from_json_str(
        r#"[
            {
                "build_name": "t1",
                "connection_name": "c1",
                "raw_sql_to_execute": "INSERT INTO x VALUES (1);",
                "raw_sql_file_locations": [],
                "stored_procedure_names": ["refresh_view"]
            },
            {
                "build_name": "oracle_build",
                "connection_name": "legacy"
            },
            {
                "build_name": "orphan",
                "connection_name": "nobody"
            }
        ]"#,
    )
    .unwrap()
}

fn credentials() -> HashMap<String, ConnectionProfile> {
    HashMap::from([
        ("c1".to_string(), profile("c1", "scripted")),
        ("legacy".to_string(), profile("legacy", "oracle")),
    ])
}

#[tokio::test]
async fn runs_resolved_build_on_registered_dialect() -> Result<(), DbBuilderError> {
    let script = Script::new();
    let sink = Arc::new(RecordingSink::default());
    let manifest = manifest();
    let credentials = credentials();

    let summary = BuildRunner::new(&manifest, &credentials)
        .with_registry(script.registry())
        .with_executor(BuildExecutor::new(sink.clone()))
        .run("t1")
        .await?;

    assert_eq!(summary.build_name, "t1");
    assert_eq!(summary.connection_name, "c1");
    assert_eq!(script.connects(), 1);
    assert_eq!(
        script.calls(),
        vec![
            Call::Batch("INSERT INTO x VALUES (1);".into()),
            Call::Procedure("refresh_view".into(), vec![]),
            Call::Close,
        ]
    );
    assert_eq!(sink.finished().len(), 2);
    Ok(())
}

#[tokio::test]
async fn unknown_build_fails_before_connecting() {
    let script = Script::new();
    let manifest = manifest();
    let credentials = credentials();

    let err = BuildRunner::new(&manifest, &credentials)
        .with_registry(script.registry())
        .run("does_not_exist")
        .await
        .unwrap_err();

    assert!(matches!(&err, DbBuilderError::ConfigError(msg) if msg.contains("does_not_exist")));
    assert_eq!(script.connects(), 0);
    assert!(script.calls().is_empty());
}

#[tokio::test]
async fn unknown_connection_fails_before_connecting() {
    let script = Script::new();
    let manifest = manifest();
    let credentials = credentials();

    let err = BuildRunner::new(&manifest, &credentials)
        .with_registry(script.registry())
        .run("orphan")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(script.connects(), 0);
}

#[tokio::test]
async fn unknown_dialect_fails_before_any_query() {
    let script = Script::new();
    let manifest = manifest();
    let credentials = credentials();

    let err = BuildRunner::new(&manifest, &credentials)
        .with_registry(script.registry())
        .run("oracle_build")
        .await
        .unwrap_err();

    assert!(matches!(&err, DbBuilderError::ConfigError(msg) if msg.contains("oracle")));
    assert_eq!(script.connects(), 0);
    assert!(script.calls().is_empty());
}

#[tokio::test]
async fn handle_construction_rejects_unknown_dialect() {
    let script = Script::new();
    let err = ConnectionHandle::open(&script.registry(), &profile("legacy", "oracle"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(script.connects(), 0);
}

#[test]
fn resolve_reports_dialect_without_connecting() {
    let script = Script::new();
    let manifest = manifest();
    let credentials = credentials();

    let resolved = BuildRunner::new(&manifest, &credentials)
        .with_registry(script.registry())
        .resolve("t1")
        .unwrap();

    assert_eq!(resolved.dialect_id, "scripted");
    assert_eq!(resolved.profile.name, "c1");
    assert_eq!(plan_steps(&resolved.build).len(), 2);
    assert_eq!(script.connects(), 0);
}
