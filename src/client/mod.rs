//! Sphinx HMAC - Client Library
//!
//! Signs outgoing requests and verifies response signatures, running the
//! session handshake when the bound engine is session-capable.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
