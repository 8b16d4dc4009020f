use std::error::Error;
use std::sync::Arc;

use mssql_adapter::driver::ColumnInfo;
use mssql_adapter::prelude::*;
use mssql_adapter::test_utils::{ScriptedDriver, SessionCall};

fn manager_for(driver: &ScriptedDriver) -> ConnectionManager {
    let creds = CredentialRecord::builder("ODBC Driver 17 for SQL Server", "sql01", "analytics", "dbo")
        .sql_auth("etl", "s3cret")
        .build()
        .unwrap();
    ConnectionManager::new(creds, Arc::new(driver.clone()))
}

#[tokio::test]
async fn database_error_keeps_message_and_closes_handle() {
    let driver = ScriptedDriver::new();
    driver.push_database_error(
        "Violation of PRIMARY KEY constraint 'PK_t'. Cannot insert duplicate key in object 'dbo.t'.\n",
    );
    let manager = manager_for(&driver);

    let err = manager
        .run_query("model.orders", QueryRequest::new("INSERT INTO t VALUES (1)"))
        .await
        .unwrap_err();

    match &err {
        AdapterError::DatabaseError(message) => {
            assert!(message.contains("Violation of PRIMARY KEY constraint"));
            assert!(!message.ends_with('\n'));
        }
        other => panic!("expected DatabaseError, got {other:?}"),
    }
    let info = manager.handle_info("model.orders").await.unwrap();
    assert_eq!(info.state, ConnectionState::Closed);
    assert!(!info.transaction_open);
    // the open transaction is rolled back before the session is closed
    assert_eq!(
        driver.calls(),
        vec![
            SessionCall::Begin,
            SessionCall::Execute {
                sql: "INSERT INTO t VALUES (1)".to_string()
            },
            SessionCall::Rollback,
            SessionCall::Close,
        ]
    );
}

#[tokio::test]
async fn unclassified_driver_error_becomes_runtime_error() {
    let driver = ScriptedDriver::new();
    driver.push_other_error("cannot convert column 3 to i64");
    let manager = manager_for(&driver);

    let err = manager
        .run_query("seed", QueryRequest::new("SELECT weird FROM t").auto_begin(false))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "RuntimeError");
    assert!(err.to_string().contains("cannot convert column 3 to i64"));
    assert!(err.source().is_some());
    let info = manager.handle_info("seed").await.unwrap();
    assert_eq!(info.state, ConnectionState::Closed);
}

#[tokio::test]
async fn release_errors_are_swallowed() {
    let driver = ScriptedDriver::new();
    driver.push_database_error("Invalid object name 'dbo.missing'.");
    driver.fail_next_close("connection reset by peer");
    let manager = manager_for(&driver);

    let err = manager
        .run_query("seed", QueryRequest::new("SELECT * FROM dbo.missing").auto_begin(false))
        .await
        .unwrap_err();

    match err {
        AdapterError::DatabaseError(message) => {
            assert_eq!(message, "Invalid object name 'dbo.missing'.");
        }
        other => panic!("expected DatabaseError, got {other:?}"),
    }
    let info = manager.handle_info("seed").await.unwrap();
    assert_eq!(info.state, ConnectionState::Closed);
}

#[tokio::test]
async fn worker_recovers_after_a_database_error() {
    let driver = ScriptedDriver::new();
    driver.push_database_error("Incorrect syntax near 'FORM'.");
    let manager = manager_for(&driver);

    manager
        .run_query("seed", QueryRequest::new("SELECT * FORM t"))
        .await
        .unwrap_err();
    let (info, result) = manager
        .run_query("seed", QueryRequest::new("SELECT * FROM t"))
        .await
        .unwrap();

    assert_eq!(info.state, ConnectionState::Open);
    assert!(info.transaction_open);
    assert_eq!(result.status(), "OK");
    assert_eq!(driver.dial_count(), 2);
}

#[tokio::test]
async fn fetch_returns_typed_rows() {
    let driver = ScriptedDriver::new();
    driver.push_rows(
        &["id", "name"],
        vec![
            vec![RowValues::Null, RowValues::Text("alpha".to_string())],
            vec![RowValues::Int(2), RowValues::Text("beta".to_string())],
        ],
    );
    let manager = manager_for(&driver);

    let (_, result) = manager
        .run_query(
            "seed",
            QueryRequest::new("SELECT id, name FROM t").fetch(true).auto_begin(false),
        )
        .await
        .unwrap();

    assert_eq!(result.status(), "OK");
    let types: Vec<CellType> = result.columns().iter().map(|c| c.cell_type).collect();
    assert_eq!(types, vec![CellType::Integer, CellType::Text]);
    let rows = result.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.results[1].get("id"), Some(&RowValues::Int(2)));
    assert_eq!(
        rows.results[0].get("name").and_then(RowValues::as_text),
        Some("alpha")
    );
}

#[tokio::test]
async fn without_fetch_only_the_status_comes_back() {
    let driver = ScriptedDriver::new();
    driver.push_cursor(DriverCursor {
        columns: vec![ColumnInfo::new("n", Some(CellType::Integer))],
        rows: vec![vec![RowValues::Int(1)]],
        status_message: Some("INSERT 0 1".to_string()),
    });
    let manager = manager_for(&driver);

    let (status, rows) = manager.execute("seed", "INSERT INTO t VALUES (1)", false, false).await.unwrap();

    assert_eq!(status, "INSERT 0 1");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn get_status_falls_back_to_ok() {
    assert_eq!(ConnectionManager::get_status(&DriverCursor::default()), "OK");
    let cursor = DriverCursor {
        status_message: Some("SELECT 3".to_string()),
        ..DriverCursor::default()
    };
    assert_eq!(ConnectionManager::get_status(&cursor), "SELECT 3");
}
