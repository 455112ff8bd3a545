//! Sphinx HMAC - Server Library
//!
//! - **Route config**: [`HmacServerConfig`] decides per route whether HMAC
//!   applies, with which selector and adapter
//! - **Adapters**: [`AdapterKind`] header, URI and session strategies
//! - **Pipeline**: [`HmacServer`] verifies requests and signs responses
//! - **Registries**: [`NonceRegistry`] replay guard, [`SessionRegistry`]
//!   for established sessions
//! - **axum**: [`hmac_middleware`] (requires `axum` feature)

mod adapter;
mod config;
mod keys;
#[cfg(feature = "axum")]
mod middleware;
mod replay;
#[allow(clippy::module_inception)]
mod server;
mod session;

pub use adapter::{AdapterError, AdapterKind, Identity, RequestContext};
pub use config::*;
pub use keys::*;
#[cfg(feature = "axum")]
#[cfg_attr(docsrs, doc(cfg(feature = "axum")))]
pub use middleware::*;
pub use replay::*;
pub use server::*;
pub use session::*;
