#![cfg(feature = "sqlite")]

use std::path::{Path, PathBuf};
use std::time::Duration;

use db_builder::prelude::*;
use rusqlite::Connection;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn db_path(&self) -> PathBuf {
        self.path("build.db")
    }

    fn credentials(&self) -> PathBuf {
        self.write(
            "config.ini",
            &format!(
                "[local]\nhost = localhost\nport = 0\ndefault_schema = {}\nusername = none\npassword = none\ndb_type = sqlite\n",
                self.db_path().display()
            ),
        )
    }

    fn manifest(&self, builds: &serde_json::Value) -> PathBuf {
        self.write("settings.json", &builds.to_string())
    }
}

fn count(db: &Path, sql: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[tokio::test]
async fn builds_schema_from_inline_sql_and_files() -> Result<(), DbBuilderError> {
    let ws = Workspace::new();
    let tables = ws.write(
        "01_tables.sql",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL);\n\
         CREATE TABLE order_facts (day TEXT, revenue REAL);",
    );
    let seed = ws.write(
        "02_seed.sql",
        "INSERT INTO orders VALUES (1, 10.0);\nINSERT INTO orders VALUES (2, 32.5);",
    );
    let manifest_path = ws.manifest(&serde_json::json!([{
        "build_name": "nightly",
        "connection_name": "local",
        "raw_sql_to_execute": "DROP TABLE IF EXISTS orders; DROP TABLE IF EXISTS order_facts;",
        "raw_sql_file_locations": [tables, seed],
        "stored_procedure_names": []
    }]));

    let manifest = Manifest::from_path(&manifest_path)?;
    let credentials = IniCredentials::from_path(ws.credentials())?;
    let summary = BuildRunner::new(&manifest, &credentials)
        .run("nightly")
        .await?;

    assert_eq!(summary.steps_executed, 3);
    assert_eq!(count(&ws.db_path(), "SELECT COUNT(*) FROM orders"), 2);

    // builds are repeatable: the inline SQL drops what the files create
    BuildRunner::new(&manifest, &credentials)
        .run("nightly")
        .await?;
    assert_eq!(count(&ws.db_path(), "SELECT COUNT(*) FROM orders"), 2);
    Ok(())
}

#[tokio::test]
async fn failing_statement_rolls_back_its_whole_file() -> Result<(), DbBuilderError> {
    let ws = Workspace::new();
    let good = ws.write("01_good.sql", "INSERT INTO audit VALUES ('first');");
    let bad = ws.write(
        "02_bad.sql",
        "INSERT INTO audit VALUES ('second');\nINSERT INTO no_such_table VALUES (1);",
    );
    let never = ws.write("03_never.sql", "INSERT INTO audit VALUES ('third');");
    let manifest_path = ws.manifest(&serde_json::json!([{
        "build_name": "audit",
        "connection_name": "local",
        "raw_sql_to_execute": "CREATE TABLE audit (note TEXT);",
        "raw_sql_file_locations": [good, bad.clone(), never]
    }]));

    let manifest = Manifest::from_path(&manifest_path)?;
    let credentials = IniCredentials::from_path(ws.credentials())?;
    let err = BuildRunner::new(&manifest, &credentials)
        .run("audit")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Execution);
    let DbBuilderError::StepFailed { identifier, .. } = &err else {
        panic!("expected step failure, got {err:?}");
    };
    assert_eq!(identifier.as_deref(), Some(bad.display().to_string().as_str()));

    let db = ws.db_path();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM audit"), 1);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM audit WHERE note = 'second'"),
        0
    );
    Ok(())
}

#[tokio::test]
async fn sqlite_profiles_cannot_call_procedures() -> Result<(), DbBuilderError> {
    let ws = Workspace::new();
    let manifest_path = ws.manifest(&serde_json::json!([{
        "build_name": "procs",
        "connection_name": "local",
        "stored_procedure_names": ["refresh_view"]
    }]));

    let manifest = Manifest::from_path(&manifest_path)?;
    let credentials = IniCredentials::from_path(ws.credentials())?;
    let err = BuildRunner::new(&manifest, &credentials)
        .run("procs")
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);
    assert!(err.to_string().contains("refresh_view"));
    Ok(())
}

#[tokio::test]
async fn timed_out_step_is_rolled_back_and_connection_released() -> Result<(), DbBuilderError> {
    let ws = Workspace::new();
    Connection::open(ws.db_path())
        .unwrap()
        .execute_batch("CREATE TABLE t (n INTEGER);")
        .unwrap();
    let manifest_path = ws.manifest(&serde_json::json!([{
        "build_name": "slow",
        "connection_name": "local",
        "raw_sql_to_execute": "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000000) INSERT INTO t SELECT count(*) FROM c;"
    }]));

    let manifest = Manifest::from_path(&manifest_path)?;
    let credentials = IniCredentials::from_path(ws.credentials())?;
    let executor = BuildExecutor::default().with_options(ExecutorOptions {
        step_timeout: Some(Duration::from_millis(20)),
    });
    let err = BuildRunner::new(&manifest, &credentials)
        .with_executor(executor)
        .run("slow")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));

    // no other session may still hold the database
    let db = ws.db_path();
    let check = Connection::open(&db).unwrap();
    check.execute_batch("BEGIN EXCLUSIVE; COMMIT;").unwrap();
    drop(check);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count(&db, "SELECT COUNT(*) FROM t"), 0);
    Ok(())
}
