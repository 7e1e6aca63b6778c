//! End-to-end queries over real XML-RPC/HTTP against a mock daemon.

use std::time::Duration;

use kastatus_core::transport::{Endpoint, TransportError};
use kastatus_core::transport::xmlrpc_http::MAX_BODY_BYTES;
use kastatus_core::value::RpcValue;
use kastatus_core::{
    ClientError, ConnectionState, KadrxStatus, RetryPolicy, StatusClient, XmitdStatus, build_info,
};
use kastatus_test_utils::fixtures;
use kastatus_test_utils::{MockDaemon, MockReply, TestConfigBuilder};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    let config = TestConfigBuilder::new().max_attempts(max_attempts).build();
    RetryPolicy::from_config(&config.retry)
}

#[test_log::test(tokio::test)]
async fn test_kadrx_status_over_http() {
    let daemon = MockDaemon::with_status(fixtures::kadrx_reply()).await;
    let config = TestConfigBuilder::new()
        .kadrx_endpoint(&daemon.endpoint())
        .build();
    let mut client = StatusClient::kadrx(
        Endpoint::from(&config.kadrx),
        RetryPolicy::from_config(&config.retry),
    );

    let record = client.get_status().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(record.timestamp_utc(), fixtures::reply_timestamp());

    let status = KadrxStatus::from_record(&record).unwrap();
    assert!(status.gps_time_server_good);
    assert_eq!(status.osc_frequencies[2], 3.4e10);
    assert_eq!(daemon.requests(), 1);
    assert_eq!(daemon.last_user_agent(), Some(build_info::user_agent()));
}

#[test_log::test(tokio::test)]
async fn test_xmitd_status_over_http() {
    let daemon = MockDaemon::with_status(fixtures::xmitd_reply()).await;
    let config = TestConfigBuilder::new()
        .xmitd_endpoint(&daemon.endpoint())
        .build();
    let mut client = StatusClient::xmitd(
        Endpoint::from(&config.xmitd),
        RetryPolicy::from_config(&config.retry),
    );

    let record = client.get_status().await.unwrap();
    let status = XmitdStatus::from_record(&record).unwrap();
    assert!(status.standby);
    assert!(status.active_faults().is_empty());
    assert_eq!(status.temperature, 35.2);
}

#[test_log::test(tokio::test)]
async fn test_xmitd_reply_missing_counters_is_protocol_mismatch() {
    let mut reply = fixtures::xmitd_reply();
    for name in [
        "serial_connected",
        "temperature",
        "auto_pulse_fault_resets",
        "blower_fault_count",
        "blower_fault_time",
    ] {
        reply = fixtures::without_member(reply, name);
    }
    let daemon = MockDaemon::with_status(reply).await;
    let mut client = StatusClient::xmitd(daemon.endpoint(), fast_policy(3));

    let err = client.get_status().await.unwrap_err();
    assert!(matches!(err, ClientError::ProtocolMismatch(_)), "{err}");
    assert_eq!(daemon.requests(), 1);
}

#[test_log::test(tokio::test)]
async fn test_persistent_connection_serves_repeated_queries() {
    let daemon = MockDaemon::with_status(fixtures::kadrx_reply()).await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(3));

    for _ in 0..3 {
        client.get_status().await.unwrap();
    }
    assert_eq!(daemon.requests(), 3);
}

#[test_log::test(tokio::test)]
async fn test_fault_reply_is_daemon_fault() {
    let daemon = MockDaemon::start(MockReply::Fault {
        code: 2,
        message: "hardware not initialised".to_string(),
    })
    .await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(3));

    let err = client.get_status().await.unwrap_err();
    assert_eq!(
        err,
        ClientError::DaemonFault("hardware not initialised".to_string())
    );
    assert_eq!(daemon.requests(), 1);
}

#[test_log::test(tokio::test)]
async fn test_garbage_body_is_protocol_mismatch() {
    let daemon = MockDaemon::start(MockReply::Raw("<html>oops</html>".to_string())).await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(3));

    let err = client.get_status().await.unwrap_err();
    assert!(matches!(err, ClientError::ProtocolMismatch(_)), "{err}");
    assert_eq!(daemon.requests(), 1);
}

#[test_log::test(tokio::test)]
async fn test_oversized_body_is_protocol_mismatch() {
    let body = "x".repeat(MAX_BODY_BYTES + 1);
    let daemon = MockDaemon::start(MockReply::Raw(body)).await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(3));

    let err = client.get_status().await.unwrap_err();
    assert!(matches!(err, ClientError::ProtocolMismatch(_)), "{err}");
    assert_eq!(daemon.requests(), 1);
}

#[test_log::test(tokio::test)]
async fn test_deeply_nested_reply_is_protocol_mismatch() {
    let mut body = String::from("<methodResponse><params><param>");
    body.push_str(&"<value><array><data>".repeat(5_000));
    body.push_str(&"</data></array></value>".repeat(5_000));
    body.push_str("</param></params></methodResponse>");
    let daemon = MockDaemon::start(MockReply::Raw(body)).await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(3));

    let err = client.get_status().await.unwrap_err();
    assert!(matches!(err, ClientError::ProtocolMismatch(_)), "{err}");
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test_log::test(tokio::test)]
async fn test_wrong_field_type_is_protocol_mismatch() {
    let reply = fixtures::with_member(
        fixtures::kadrx_reply(),
        "noXmitBitmap",
        RpcValue::from("none"),
    );
    let daemon = MockDaemon::with_status(reply).await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(3));

    let err = client.get_status().await.unwrap_err();
    assert!(matches!(err, ClientError::ProtocolMismatch(_)), "{err}");
}

#[test_log::test(tokio::test)]
async fn test_server_error_is_retried() {
    let daemon = MockDaemon::start(MockReply::Http(503)).await;
    let config = TestConfigBuilder::new()
        .max_attempts(2)
        .base_backoff_ms(5)
        .backoff_multiplier(1.0)
        .build();
    let policy = RetryPolicy::from_config(&config.retry);
    assert_eq!(policy.backoff_before(2), Duration::from_millis(5));
    let mut client = StatusClient::kadrx(daemon.endpoint(), policy);

    let err = client.get_status().await.unwrap_err();
    assert_eq!(
        err,
        ClientError::Unreachable {
            attempts: 2,
            last: TransportError::Http { status: 503 },
        }
    );
    assert_eq!(daemon.requests(), 2);
}

#[test_log::test(tokio::test)]
async fn test_slow_daemon_times_out() {
    let daemon = MockDaemon::with_status(fixtures::kadrx_reply()).await;
    daemon.set_delay(Duration::from_millis(300));
    let config = TestConfigBuilder::new()
        .max_attempts(1)
        .call_timeout_ms(50)
        .build();
    let policy = RetryPolicy::from_config(&config.retry);
    let mut client = StatusClient::kadrx(daemon.endpoint(), policy);

    let err = client.get_status().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Unreachable {
            last: TransportError::CallTimeout(_),
            ..
        }
    ));
    assert_eq!(client.state(), ConnectionState::Faulted);
}

#[test_log::test(tokio::test)]
async fn test_recovers_when_daemon_comes_back() {
    let daemon = MockDaemon::start(MockReply::Http(500)).await;
    let mut client = StatusClient::kadrx(daemon.endpoint(), fast_policy(1));

    assert!(client.get_status().await.is_err());
    assert_eq!(client.state(), ConnectionState::Faulted);

    daemon.set_reply(MockReply::Status(fixtures::kadrx_reply()));
    client.get_status().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test_log::test(tokio::test)]
async fn test_stopped_daemon_is_unreachable() {
    let daemon = MockDaemon::with_status(fixtures::kadrx_reply()).await;
    let endpoint = daemon.endpoint();
    daemon.stop().await;

    let mut client = StatusClient::kadrx(endpoint, fast_policy(2));
    let err = client.get_status().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Unreachable {
            attempts: 2,
            last: TransportError::ConnectionRefused { .. }
        }
    ));
}
