//! Retrying `getStatus` queries against one daemon.
//!
//! The client owns one transport channel and a small connection state
//! machine:
//!
//! ```text
//! Disconnected --connect ok--> Connected --call fails--> Faulted
//!      ^                                                   |
//!      +------------- close / drop            connect ok --+--> Connected
//! ```
//!
//! Each [`get_status`](StatusClient::get_status) performs fresh round
//! trips; nothing is cached. Transient failures are retried with
//! exponential backoff, with the channel closed while sleeping. Daemon
//! faults and replies that do not match the schema are returned at once.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use kastatus_config::RetryConfig;

use crate::decoder;
use crate::record::StatusRecord;
use crate::schema::{KADRX_SCHEMA, StatusSchema, XMITD_SCHEMA};
use crate::transport::{Endpoint, Transport, TransportError, XmlRpcTransport};

/// XML-RPC method both daemons expose for status snapshots.
pub const STATUS_METHOD: &str = "getStatus";

/// How hard the client tries before giving up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first, at least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound on each connect and each call.
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }

    /// Sleep before attempt `attempt` (1-based). Zero for the first.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let nanos = self.base_backoff.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        // `as` saturates, so huge products clamp rather than wrap.
        Duration::from_nanos(nanos.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Where the client's channel stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// The one classified failure a status query can end with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("daemon unreachable after {attempts} attempt(s): {last}")]
    Unreachable { attempts: u32, last: TransportError },

    #[error("daemon reported a fault: {0}")]
    DaemonFault(String),

    #[error("daemon reply does not match the expected protocol: {0}")]
    ProtocolMismatch(String),
}

/// Polls one daemon's `getStatus` method.
pub struct StatusClient {
    transport: Box<dyn Transport>,
    endpoint: Endpoint,
    schema: StatusSchema,
    policy: RetryPolicy,
    state: ConnectionState,
}

impl StatusClient {
    /// Client for kadrx over XML-RPC/HTTP.
    pub fn kadrx(endpoint: Endpoint, policy: RetryPolicy) -> Self {
        Self::with_transport(Box::new(XmlRpcTransport::new()), endpoint, KADRX_SCHEMA, policy)
    }

    /// Client for ka_xmitd over XML-RPC/HTTP.
    pub fn xmitd(endpoint: Endpoint, policy: RetryPolicy) -> Self {
        Self::with_transport(Box::new(XmlRpcTransport::new()), endpoint, XMITD_SCHEMA, policy)
    }

    pub fn with_transport(
        transport: Box<dyn Transport>,
        endpoint: Endpoint,
        schema: StatusSchema,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            endpoint,
            schema,
            policy,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn schema(&self) -> &StatusSchema {
        &self.schema
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one fresh status snapshot.
    pub async fn get_status(&mut self) -> Result<StatusRecord, ClientError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let last = match self.attempt(attempt).await {
                Ok(record) => return Ok(record),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Transient(err)) => err,
            };

            if attempt >= max_attempts {
                warn!(
                    endpoint = %self.endpoint,
                    attempts = attempt,
                    error = %last,
                    "Daemon unreachable, giving up"
                );
                return Err(ClientError::Unreachable {
                    attempts: attempt,
                    last,
                });
            }

            attempt += 1;
            let delay = self.policy.backoff_before(attempt);
            debug!(
                endpoint = %self.endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&mut self, attempt: u32) -> Result<StatusRecord, Attempt> {
        let timeout = self.policy.call_timeout;

        if self.state != ConnectionState::Connected {
            self.state = ConnectionState::Connecting;
            debug!(endpoint = %self.endpoint, attempt, "Connecting to daemon");
            if let Err(e) = self.transport.connect(&self.endpoint, timeout).await {
                return Err(self.fail(attempt, e));
            }
            self.state = ConnectionState::Connected;
            info!(endpoint = %self.endpoint, schema = self.schema.name, "Connected");
        }

        let reply = match self.transport.call(STATUS_METHOD, &[], timeout).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(attempt, e)),
        };

        decoder::decode(&reply, &self.schema).map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "Status reply rejected");
            Attempt::Fatal(ClientError::ProtocolMismatch(e.to_string()))
        })
    }

    /// Classify a transport failure and update state.
    fn fail(&mut self, attempt: u32, err: TransportError) -> Attempt {
        match err {
            TransportError::RemoteFault { code, message } => {
                warn!(endpoint = %self.endpoint, code, %message, "Daemon fault");
                Attempt::Fatal(ClientError::DaemonFault(message))
            }
            err if err.is_transient() => {
                warn!(endpoint = %self.endpoint, attempt, error = %err, "Status attempt failed");
                self.transport.close();
                self.state = ConnectionState::Faulted;
                Attempt::Transient(err)
            }
            err => {
                warn!(endpoint = %self.endpoint, error = %err, "Protocol failure");
                Attempt::Fatal(ClientError::ProtocolMismatch(err.to_string()))
            }
        }
    }

    /// Release the channel. The next query reconnects.
    pub fn close(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for StatusClient {
    fn drop(&mut self) {
        self.transport.close();
    }
}

impl fmt::Debug for StatusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusClient")
            .field("endpoint", &self.endpoint)
            .field("schema", &self.schema.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

enum Attempt {
    Transient(TransportError),
    Fatal(ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_before(1), Duration::ZERO);
        assert_eq!(policy.backoff_before(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_before(4), Duration::from_millis(400));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_attempts: 5,
            base_backoff_ms: 250,
            backoff_multiplier: 1.5,
            call_timeout_ms: 800,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_backoff, Duration::from_millis(250));
        assert_eq!(policy.call_timeout, Duration::from_millis(800));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(375));
    }

    #[test]
    fn test_new_client_is_disconnected() {
        let client = StatusClient::kadrx(Endpoint::new("localhost", 8081), RetryPolicy::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.schema().name, "kadrx");
        assert_eq!(client.endpoint().port, 8081);
    }
}
