//! Startup buffering and replay behavior of the local bridge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msv_bridge::{
    event_handler, local_bridge, task_handler, Bridge, BridgeError, BridgeOptions, CallKind,
    EventOptions, ExportTable, LocalBridge, Payload, TaskOptions,
};
use msv_config::Config;
use msv_telemetry::{LogLevel, Logger};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

fn quiet_bridge() -> Arc<LocalBridge> {
    Arc::new(LocalBridge::new(Logger::new("Bridge:local", LogLevel::Off)))
}

/// Sleeps `delay_ms` from the payload, then echoes `id`.
fn delayed_echo() -> ExportTable {
    ExportTable::new().task(
        "delayed",
        task_handler(|payload: Payload| async move {
            let delay = payload["delay_ms"].as_u64().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(delay)).await;
            anyhow::Ok(payload["id"].clone())
        }),
    )
}

#[tokio::test]
async fn test_buffered_tasks_resolve_in_submission_order() {
    let bridge = quiet_bridge();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Later submissions finish their work first.
    for (id, delay) in [(1, 60), (2, 30), (3, 0)] {
        let bridge = bridge.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = bridge
                .run("delayed", json!({ "id": id, "delay_ms": delay }), TaskOptions::default())
                .await;
            let _ = tx.send(result);
        });
    }
    drop(tx);

    while bridge.pending_calls(CallKind::Task) < 3 {
        tokio::task::yield_now().await;
    }
    bridge.start_listening("echo", delayed_echo()).await.unwrap();
    bridge.enable();

    let mut resolved = Vec::new();
    while let Some(result) = rx.recv().await {
        resolved.push(result.unwrap());
    }
    assert_eq!(resolved, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(bridge.pending_calls(CallKind::Task), 0);
}

#[tokio::test]
async fn test_buffered_result_matches_live_result() {
    let bridge = quiet_bridge();
    let buffered = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .run("delayed", json!({ "id": "x" }), TaskOptions::default())
                .await
        })
    };
    while bridge.pending_calls(CallKind::Task) == 0 {
        tokio::task::yield_now().await;
    }

    bridge.start_listening("echo", delayed_echo()).await.unwrap();
    bridge.enable();

    let live = bridge
        .run("delayed", json!({ "id": "x" }), TaskOptions::default())
        .await
        .unwrap();
    assert_eq!(buffered.await.unwrap().unwrap(), live);
}

#[tokio::test]
async fn test_buffered_unknown_task_fails_on_enable() {
    let bridge = quiet_bridge();
    let pending = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run("nobody", json!({}), TaskOptions::default()).await })
    };
    while bridge.pending_calls(CallKind::Task) == 0 {
        tokio::task::yield_now().await;
    }

    bridge.enable();
    assert_eq!(
        pending.await.unwrap(),
        Err(BridgeError::UnknownTask("nobody".to_string()))
    );
}

#[tokio::test]
async fn test_event_sent_before_enable_is_delivered_once() {
    let bridge = quiet_bridge();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();

    bridge
        .send("tick", json!({ "n": 1 }), EventOptions::default())
        .await
        .unwrap();
    assert_eq!(bridge.pending_calls(CallKind::Event), 1);

    bridge
        .start_listening(
            "clock",
            ExportTable::new().event(
                "tick",
                event_handler(move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                }),
            ),
        )
        .await
        .unwrap();
    bridge.enable();
    bridge.enable();

    tokio::time::timeout(Duration::from_secs(2), async {
        while delivered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("event never delivered");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.pending_calls(CallKind::Event), 0);
}

#[tokio::test]
async fn test_events_replay_before_tasks() {
    let bridge = quiet_bridge();
    let journal = Arc::new(Mutex::new(Vec::<String>::new()));

    let caller = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run("work", json!({}), TaskOptions::default()).await })
    };
    while bridge.pending_calls(CallKind::Task) == 0 {
        tokio::task::yield_now().await;
    }
    bridge
        .send("audit", json!({}), EventOptions::default())
        .await
        .unwrap();

    let task_journal = journal.clone();
    let event_journal = journal.clone();
    bridge
        .start_listening(
            "worker",
            ExportTable::new()
                .task(
                    "work",
                    task_handler(move |_| {
                        let journal = task_journal.clone();
                        async move {
                            journal.lock().push("task".to_string());
                            anyhow::Ok(json!("done"))
                        }
                    }),
                )
                .event(
                    "audit",
                    event_handler(move |_| {
                        let journal = event_journal.clone();
                        async move {
                            journal.lock().push("event".to_string());
                            anyhow::Ok(())
                        }
                    }),
                ),
        )
        .await
        .unwrap();
    bridge.enable();

    assert_eq!(caller.await.unwrap().unwrap(), json!("done"));
    tokio::task::yield_now().await;
    assert_eq!(*journal.lock(), vec!["event".to_string(), "task".to_string()]);
}

#[tokio::test]
async fn test_failing_listener_does_not_affect_others() {
    let bridge = quiet_bridge();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();

    bridge
        .start_listening(
            "broken",
            ExportTable::new().event(
                "created",
                event_handler(|_| async { Err::<(), _>(anyhow::anyhow!("listener bug")) }),
            ),
        )
        .await
        .unwrap();
    bridge
        .start_listening(
            "healthy",
            ExportTable::new().event(
                "created",
                event_handler(move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                }),
            ),
        )
        .await
        .unwrap();
    bridge.enable();

    assert!(bridge
        .send("created", json!({}), EventOptions::default())
        .await
        .is_ok());
    assert!(bridge
        .send("nobody-listens", json!({}), EventOptions::default())
        .await
        .is_ok());

    tokio::time::timeout(Duration::from_secs(2), async {
        while delivered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("healthy listener never ran");
}

#[tokio::test]
async fn test_factory_reads_buffer_capacity() {
    let mut config = Config::new();
    config.set("buffer_capacity", json!(1));
    let factory = local_bridge();
    let bridge = factory(BridgeOptions {
        config,
        logger: Logger::root(LogLevel::Off),
        shadow_mode: false,
    })
    .unwrap();

    bridge.send("a", json!(1), EventOptions::default()).await.unwrap();
    assert_eq!(
        bridge.send("a", json!(2), EventOptions::default()).await,
        Err(BridgeError::BufferFull {
            kind: CallKind::Event,
            capacity: 1,
        })
    );
}
