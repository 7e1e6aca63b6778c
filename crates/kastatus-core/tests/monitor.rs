//! Background polling with the status monitor.

use std::time::Duration;

use kastatus_core::schema::KADRX_SCHEMA;
use kastatus_core::transport::{Endpoint, TransportError};
use kastatus_core::{MonitorEvent, RetryPolicy, StatusClient, StatusMonitor};
use kastatus_test_utils::fixtures;
use kastatus_test_utils::{ScriptedTransport, TransportOp};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

fn single_attempt() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    }
}

fn monitor_for(transport: ScriptedTransport) -> StatusMonitor {
    let client = StatusClient::with_transport(
        transport.boxed(),
        Endpoint::new("radar-host", 8081),
        KADRX_SCHEMA,
        single_attempt(),
    );
    StatusMonitor::spawn(client, Duration::from_secs(1))
}

fn kind(event: &MonitorEvent) -> &'static str {
    match event {
        MonitorEvent::Status(_) => "status",
        MonitorEvent::Error(_) => "error",
        MonitorEvent::Responsive(true) => "up",
        MonitorEvent::Responsive(false) => "down",
    }
}

#[tokio::test(start_paused = true)]
async fn test_responsiveness_transitions() {
    let transport = ScriptedTransport::new()
        .reply(fixtures::kadrx_reply())
        .fail_call(TransportError::Transport("connection reset".to_string()))
        .reply(fixtures::kadrx_reply());
    let log = transport.log();
    let mut monitor = monitor_for(transport);
    let mut events = monitor.subscribe();

    let mut seen = Vec::new();
    for _ in 0..6 {
        seen.push(kind(&events.recv().await.unwrap()));
    }
    assert_eq!(seen, ["up", "status", "down", "error", "up", "status"]);

    monitor.shutdown();
    monitor.join().await;
    assert_eq!(log.ops().last(), Some(&TransportOp::Close));
}

#[tokio::test(start_paused = true)]
async fn test_initial_failure_is_not_a_transition() {
    let mut monitor = monitor_for(ScriptedTransport::refusing());
    let mut events = monitor.subscribe();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, MonitorEvent::Error(_)));

    monitor.shutdown();
    monitor.join().await;
    loop {
        match events.try_recv() {
            Ok(event) => assert!(matches!(event, MonitorEvent::Error(_))),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_polls_once_per_interval() {
    let transport = ScriptedTransport::new()
        .reply(fixtures::kadrx_reply())
        .reply(fixtures::kadrx_reply())
        .reply(fixtures::kadrx_reply());
    let log = transport.log();
    let mut monitor = monitor_for(transport);
    let mut events = monitor.subscribe();

    let start = tokio::time::Instant::now();
    let mut snapshots = 0;
    while snapshots < 3 {
        if let MonitorEvent::Status(record) = events.recv().await.unwrap() {
            assert_eq!(record.timestamp_utc(), fixtures::reply_timestamp());
            snapshots += 1;
        }
    }
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(log.calls(), 3);
    assert_eq!(log.connects(), 1);

    monitor.shutdown();
    monitor.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_query() {
    let transport = ScriptedTransport::new()
        .call_delay(Duration::from_millis(500))
        .reply(fixtures::kadrx_reply())
        .reply(fixtures::kadrx_reply());
    let log = transport.log();
    let mut monitor = monitor_for(transport);
    let mut events = monitor.subscribe();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(log.calls(), 1);
    let start = tokio::time::Instant::now();
    monitor.shutdown();
    monitor.join().await;
    assert_eq!(start.elapsed(), Duration::from_millis(400));

    assert_eq!(events.recv().await.unwrap(), MonitorEvent::Responsive(true));
    assert!(matches!(events.recv().await.unwrap(), MonitorEvent::Status(_)));
    assert!(matches!(events.recv().await, Err(RecvError::Closed)));
    assert_eq!(log.calls(), 1);
    assert_eq!(log.ops().last(), Some(&TransportOp::Close));
}

#[tokio::test]
async fn test_shutdown_stops_task() {
    let mut monitor = monitor_for(ScriptedTransport::refusing());
    let _events = monitor.subscribe();
    let _late = monitor.subscribe();

    monitor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), monitor.join())
        .await
        .expect("monitor did not stop");
}
