//! In-memory [`Transport`] driven by a script of outcomes.
//!
//! Each `connect` and `call` pops the next queued outcome; every operation
//! is appended to a shared [`CallLog`] with the (tokio) instant it happened,
//! so tests can assert attempt counts and backoff spacing after handing the
//! transport to a client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use kastatus_core::transport::{Endpoint, Transport, TransportError};
use kastatus_core::{BoxFuture, RpcValue};
use tokio::time::Instant;

/// One operation observed by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOp {
    Connect(Endpoint),
    Call { method: String, params: Vec<RpcValue> },
    Close,
}

/// Shared, cloneable record of transport operations.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<(Instant, TransportOp)>>>,
}

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<(Instant, TransportOp)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, op: TransportOp) {
        self.lock().push((Instant::now(), op));
    }

    pub fn ops(&self) -> Vec<TransportOp> {
        self.lock().iter().map(|(_, op)| op.clone()).collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|op| matches!(op, TransportOp::Connect(_)))
    }

    pub fn calls(&self) -> usize {
        self.count(|op| matches!(op, TransportOp::Call { .. }))
    }

    pub fn closes(&self) -> usize {
        self.count(|op| matches!(op, TransportOp::Close))
    }

    /// Instants of each `connect`, in order.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.lock()
            .iter()
            .filter(|(_, op)| matches!(op, TransportOp::Connect(_)))
            .map(|(at, _)| *at)
            .collect()
    }

    fn count(&self, pred: impl Fn(&TransportOp) -> bool) -> usize {
        self.lock().iter().filter(|(_, op)| pred(op)).count()
    }
}

/// Fake transport replaying queued connect and call outcomes.
///
/// When a queue runs dry, `connect` falls back to the default outcome
/// (success unless built with [`refusing`](Self::refusing)) and `call`
/// fails with a channel error.
pub struct ScriptedTransport {
    connects: VecDeque<Result<(), TransportError>>,
    calls: VecDeque<Result<RpcValue, TransportError>>,
    default_connect: Result<(), TransportError>,
    call_delay: Duration,
    connected: bool,
    log: CallLog,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            connects: VecDeque::new(),
            calls: VecDeque::new(),
            default_connect: Ok(()),
            call_delay: Duration::ZERO,
            connected: false,
            log: CallLog::default(),
        }
    }

    /// A transport whose every connect is refused.
    pub fn refusing() -> Self {
        let mut transport = Self::new();
        transport.default_connect = Err(TransportError::ConnectionRefused {
            endpoint: "scripted".to_string(),
        });
        transport
    }

    pub fn connect_outcome(mut self, outcome: Result<(), TransportError>) -> Self {
        self.connects.push_back(outcome);
        self
    }

    pub fn reply(mut self, value: RpcValue) -> Self {
        self.calls.push_back(Ok(value));
        self
    }

    pub fn fail_call(mut self, err: TransportError) -> Self {
        self.calls.push_back(Err(err));
        self
    }

    /// Delay each call; a delay beyond the call timeout yields `CallTimeout`.
    pub fn call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Handle to the operation log, valid after the transport is boxed.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn boxed(self) -> Box<dyn Transport> {
        Box::new(self)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedTransport {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a Endpoint,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.log.push(TransportOp::Connect(endpoint.clone()));
            let outcome = self
                .connects
                .pop_front()
                .unwrap_or_else(|| self.default_connect.clone());
            self.connected = outcome.is_ok();
            outcome
        })
    }

    fn call<'a>(
        &'a mut self,
        method: &'a str,
        params: &'a [RpcValue],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<RpcValue, TransportError>> {
        Box::pin(async move {
            self.log.push(TransportOp::Call {
                method: method.to_string(),
                params: params.to_vec(),
            });
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            if self.call_delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::CallTimeout(timeout));
            }
            if !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }
            self.calls
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Transport("script exhausted".to_string())))
        })
    }

    fn close(&mut self) {
        self.connected = false;
        self.log.push(TransportOp::Close);
    }
}
