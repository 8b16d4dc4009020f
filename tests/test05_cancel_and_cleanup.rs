use std::sync::Arc;
use std::time::Duration;

use mssql_adapter::prelude::*;
use mssql_adapter::test_utils::{ScriptedDriver, SessionCall};
use tokio::sync::Notify;

fn manager_for(driver: &ScriptedDriver) -> ConnectionManager {
    let creds = CredentialRecord::builder("ODBC Driver 17 for SQL Server", "sql01", "analytics", "dbo")
        .sql_auth("etl", "s3cret")
        .build()
        .unwrap();
    ConnectionManager::new(creds, Arc::new(driver.clone()))
}

async fn warm_up(manager: &ConnectionManager, worker: &str) {
    manager
        .run_query(worker, QueryRequest::new("SELECT 1").auto_begin(false))
        .await
        .unwrap();
}

#[tokio::test]
async fn cancel_without_driver_support_is_a_no_op() {
    let driver = ScriptedDriver::new();
    let manager = manager_for(&driver);
    warm_up(&manager, "seed").await;

    assert!(!manager.cancel("seed"));
    assert!(!manager.cancel("nobody"));
    let info = manager.handle_info("seed").await.unwrap();
    assert_eq!(info.state, ConnectionState::Open);
}

#[tokio::test]
async fn cancel_uses_the_driver_canceller() {
    let driver = ScriptedDriver::new().with_cancellation();
    let manager = manager_for(&driver);
    warm_up(&manager, "seed").await;

    assert!(manager.cancel("seed"));
    assert_eq!(driver.cancellations(), 1);

    manager.release("seed").await;
    assert!(!manager.cancel("seed"));
    assert_eq!(driver.cancellations(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_reaches_a_running_statement() {
    let driver = ScriptedDriver::new().with_cancellation();
    let gate = Arc::new(Notify::new());
    driver.gate_sql("WAITFOR DELAY '01:00'", Arc::clone(&gate));
    let manager = Arc::new(manager_for(&driver));

    let running = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .run_query(
                    "slow",
                    QueryRequest::new("WAITFOR DELAY '01:00'").auto_begin(false),
                )
                .await
        })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while driver.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // the statement still holds the connection; cancel must not wait for it
    assert!(manager.cancel("slow"));
    assert_eq!(driver.cancellations(), 1);

    gate.notify_one();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancel_open_skips_the_excepted_worker() {
    let driver = ScriptedDriver::new().with_cancellation();
    let manager = manager_for(&driver);
    for worker in ["main", "model.a", "model.b"] {
        warm_up(&manager, worker).await;
    }
    manager.release("model.b").await;

    let cancelled = manager.cancel_open(Some("main"));

    assert_eq!(cancelled, vec!["model.a"]);
    assert_eq!(driver.cancellations(), 1);
}

#[tokio::test]
async fn cleanup_all_rolls_back_and_closes_everything() {
    let driver = ScriptedDriver::new();
    let manager = manager_for(&driver);
    manager
        .run_query("model.a", QueryRequest::new("UPDATE t SET a = 1"))
        .await
        .unwrap();
    warm_up(&manager, "model.b").await;

    let released = manager.cleanup_all().await;

    assert_eq!(released, vec!["model.a", "model.b"]);
    assert!(manager.workers().is_empty());
    assert_eq!(
        driver.session_calls(1),
        vec![
            SessionCall::Begin,
            SessionCall::Execute {
                sql: "UPDATE t SET a = 1".to_string()
            },
            SessionCall::Rollback,
            SessionCall::Close,
        ]
    );
    assert_eq!(driver.session_calls(2).last(), Some(&SessionCall::Close));
}

#[tokio::test]
async fn cleanup_all_on_an_empty_manager() {
    let driver = ScriptedDriver::new();
    let manager = manager_for(&driver);

    assert!(manager.cleanup_all().await.is_empty());
    assert!(driver.calls().is_empty());
}
