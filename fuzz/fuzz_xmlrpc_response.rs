//! Fuzz target for the XML-RPC response decoder and status decoding.
//!
//! Run with: cargo +nightly fuzz run fuzz_xmlrpc_response
//!
//! Daemon replies are untrusted network input. Every body must either
//! decode or fail with an error; successful replies are then pushed
//! through both known status schemas.

#![no_main]

use kastatus_core::decoder;
use kastatus_core::schema::{KADRX_SCHEMA, XMITD_SCHEMA};
use kastatus_core::xmlrpc::{self, MethodResponse};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(MethodResponse::Success(value)) = xmlrpc::decode_response(body) {
        for schema in [KADRX_SCHEMA, XMITD_SCHEMA] {
            if let Ok(record) = decoder::decode(&value, &schema) {
                let _ = record.to_reply(&schema);
            }
        }
    }
});
