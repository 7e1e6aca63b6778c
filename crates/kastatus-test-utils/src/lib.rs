#![deny(unsafe_code)]

//! Shared test utilities for the kastatus workspace.
//!
//! Provides a scripted in-memory transport, a mock XML-RPC daemon on a real
//! TCP port, canned status replies, config builders, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! kastatus-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod fixtures;
pub mod tracing_setup;
pub mod transport;

pub use config::{TempConfigFile, TestConfigBuilder};
pub use daemon::{MockDaemon, MockReply};
pub use transport::{CallLog, ScriptedTransport, TransportOp};
