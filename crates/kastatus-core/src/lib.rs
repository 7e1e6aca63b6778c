#![deny(unsafe_code)]

//! Kastatus core library.
//!
//! Status-polling RPC client for the Ka-band radar daemons: `kadrx` (the
//! data system controller) and `ka_xmitd` (the transmitter controller).
//! A [`StatusClient`] asks a daemon for its `getStatus` snapshot over
//! XML-RPC, validates the reply against a static schema and hands back an
//! immutable [`StatusRecord`]. The CLI and any supervisory tooling sit on
//! top of this crate.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future, used as the return type of
/// trait methods that must stay object-safe (`Box<dyn Transport>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Retrying status client and connection state machine.
pub mod client;
/// Reply-to-record decoding against a schema.
pub mod decoder;
/// Background polling task broadcasting status events.
pub mod monitor;
/// Immutable status snapshots.
pub mod record;
/// Known reply schemas and their typed views.
pub mod schema;
/// RPC transport trait and the XML-RPC/HTTP implementation.
pub mod transport;
/// Dynamic RPC values and typed field scalars.
pub mod value;
/// XML-RPC document encoding and decoding.
pub mod xmlrpc;

pub use client::{ClientError, ConnectionState, RetryPolicy, STATUS_METHOD, StatusClient};
pub use decoder::DecodeError;
pub use monitor::{MonitorEvent, StatusMonitor};
pub use record::{FieldError, StatusRecord};
pub use schema::{KadrxStatus, StatusSchema, XmitdStatus};
pub use transport::{Endpoint, Transport, TransportError, XmlRpcTransport};
pub use value::{FieldKind, FieldValue, RpcValue};
