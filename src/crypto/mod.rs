//! Sphinx HMAC - Security layer
//!
//! Implements the cryptographic side of the protocol:
//! - Key material and nonces ([`Secret`], [`KeyId`], [`Nonce`])
//! - Keyed hashing with per-message-kind domain separation ([`SignContext`])
//! - The [`HmacEngine`], which enforces single use and session ordering
//! - The session state machine ([`SessionMachine`])

mod engine;
mod keys;
mod mac;
mod session;

pub use engine::*;
pub use keys::*;
pub use mac::SignContext;
pub use session::*;
