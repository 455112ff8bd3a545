//! # Sphinx HMAC
//!
//! HMAC request/response authentication for HTTP APIs.
//!
//! A client signs each outgoing request and verifies the server's response
//! signature. The server verifies the request, exposes the authenticated key
//! id to its handlers, and signs its own response. Two exchange styles are
//! supported:
//!
//! - **Stateless**: one signed request, one signed response, one engine.
//!   The token travels in the `HMAC-Authentication` header or as the last
//!   `hmac` query parameter.
//! - **Session**: a handshake establishes a session key from both parties'
//!   nonces. Every following message is signed with that key and bound to
//!   the session's sequence counter.
//!
//! ## Feature Flags
//!
//! - `client` (default): [`client::HmacClient`] signing pipeline
//! - `server` (default): [`server::HmacServer`] verification pipeline
//! - `axum` (default): axum middleware for the server pipeline
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types, and injected traits (always included)
//! - [`crypto`]: Key material, the HMAC engine, the session state machine
//! - [`codec`]: Canonical messages, token encoding, URI token placement
//! - [`client`]: Client pipeline (requires `client` feature)
//! - [`server`]: Server pipeline (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use sphinx_hmac::prelude::*;
//!
//! let material = KeyMaterial::new(
//!     KeyId::new("app").unwrap(),
//!     Secret::new(b"shared secret".to_vec()),
//!     Algorithm::Sha256,
//! );
//!
//! // Client side
//! let mut client = HmacEngine::new(material.clone());
//! let canonical = CanonicalMessage::Request { method: "GET", uri: "/items", body: b"" };
//! let signature = client.sign_request(&canonical.to_bytes()).unwrap();
//! let token = AuthToken::Request {
//!     key_id: client.key_id().clone(),
//!     nonce: client.nonce().unwrap().clone(),
//!     signature,
//! }
//! .encode();
//!
//! // Server side
//! let AuthToken::Request { nonce, signature, .. } =
//!     AuthToken::decode(TokenKind::Request, &token).unwrap()
//! else {
//!     unreachable!()
//! };
//! let mut server = HmacEngine::responder(material, EngineMode::Stateless);
//! server.bind_nonce(nonce).unwrap();
//! server.verify_request(&canonical.to_bytes(), &signature).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Crypto layer (always included)
pub mod crypto;

// Wire codec (always included)
pub mod codec;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::*;
    pub use crate::core::*;
    pub use crate::crypto::*;

    #[cfg(feature = "client")]
    pub use crate::client::*;

    #[cfg(feature = "server")]
    pub use crate::server::*;
}

// Re-export commonly used items at crate root
pub use core::{HmacError, KeyProvider, PROTOCOL_VERSION};
pub use crypto::{HmacEngine, KeyId, KeyMaterial, Secret};
