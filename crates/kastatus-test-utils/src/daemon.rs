//! Mock XML-RPC daemon for end-to-end tests.
//!
//! [`MockDaemon`] serves `POST /RPC2` on an ephemeral localhost port with an
//! axum router, answering `getStatus` with whatever [`MockReply`] is
//! currently configured. Tests can swap the reply, add latency, and count
//! requests while a client is talking to it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use kastatus_core::transport::{DEFAULT_RPC_PATH, Endpoint};
use kastatus_core::value::RpcValue;
use kastatus_core::{STATUS_METHOD, xmlrpc};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What the mock answers to `getStatus`.
#[derive(Debug, Clone)]
pub enum MockReply {
    Status(RpcValue),
    Fault { code: i64, message: String },
    /// Bare HTTP status with an empty body.
    Http(u16),
    /// A body sent verbatim as `text/xml`.
    Raw(String),
}

struct MockState {
    reply: Mutex<MockReply>,
    delay: Mutex<Duration>,
    requests: AtomicUsize,
    last_user_agent: Mutex<Option<String>>,
}

impl MockState {
    fn new(reply: MockReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            delay: Mutex::new(Duration::ZERO),
            requests: AtomicUsize::new(0),
            last_user_agent: Mutex::new(None),
        })
    }
}

fn router(state: Arc<MockState>) -> axum::Router {
    axum::Router::new()
        .route(DEFAULT_RPC_PATH, post(handle_rpc))
        .with_state(state)
}

/// A running mock daemon. Stops serving when dropped.
pub struct MockDaemon {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl MockDaemon {
    /// Bind `127.0.0.1:0` and start serving `reply`.
    pub async fn start(reply: MockReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock daemon");
        let addr = listener.local_addr().expect("mock daemon has no address");
        let state = MockState::new(reply);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
        });
        info!(%addr, "Mock daemon listening");

        Self {
            addr,
            state,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Serve `reply` as a successful status.
    pub async fn with_status(reply: RpcValue) -> Self {
        Self::start(MockReply::Status(reply)).await
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn set_reply(&self, reply: MockReply) {
        *self.state.reply.lock().expect("reply lock poisoned") = reply;
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().expect("delay lock poisoned") = delay;
    }

    /// Number of RPC requests received so far.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn last_user_agent(&self) -> Option<String> {
        self.state
            .last_user_agent
            .lock()
            .expect("user agent lock poisoned")
            .clone()
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            // Idle keep-alive connections can hold graceful shutdown open.
            let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
        }
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn handle_rpc(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_user_agent.lock().expect("user agent lock poisoned") = user_agent;

    let delay = *state.delay.lock().expect("delay lock poisoned");
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let call = match xmlrpc::decode_call(&body) {
        Ok(call) => call,
        Err(e) => return xml(xmlrpc::encode_fault(-32700, &format!("parse error: {e}"))),
    };
    debug!(method = %call.method, "Mock daemon call");
    if call.method != STATUS_METHOD {
        return xml(xmlrpc::encode_fault(
            -32601,
            &format!("method {} not found", call.method),
        ));
    }

    let reply = state.reply.lock().expect("reply lock poisoned").clone();
    match reply {
        MockReply::Status(value) => xml(xmlrpc::encode_response(&value)),
        MockReply::Fault { code, message } => xml(xmlrpc::encode_fault(code, &message)),
        MockReply::Http(status) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        MockReply::Raw(body) => xml(body),
    }
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}
