//! Keyed-hash primitive with per-context domain separation.
//!
//! MAC input layout:
//!
//! ```text
//! label || 0x00 || binding || canonical
//! ```
//!
//! The label differs per [`SignContext`], so a digest computed for one
//! message kind never validates as another.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::core::{AuthenticationFailure, ConfigurationError, HmacError};

use super::{Algorithm, Signature};

/// Which message kind a digest is computed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignContext {
    /// Stateless request, URI-mode request, or handshake request.
    Request,
    /// Stateless response.
    Response,
    /// Server's Nonce2 during session establishment.
    SessionEstablish,
    /// Client to server message inside a session.
    SessionRequest,
    /// Server to client message inside a session.
    SessionResponse,
}

impl SignContext {
    pub(crate) fn label(self) -> &'static [u8] {
        match self {
            SignContext::Request => b"sphinx-hmac/request",
            SignContext::Response => b"sphinx-hmac/response",
            SignContext::SessionEstablish => b"sphinx-hmac/session-establish",
            SignContext::SessionRequest => b"sphinx-hmac/session-request",
            SignContext::SessionResponse => b"sphinx-hmac/session-response",
        }
    }

    /// Whether this context is keyed by the derived session key.
    pub fn is_session_message(self) -> bool {
        matches!(self, SignContext::SessionRequest | SignContext::SessionResponse)
    }
}

enum MacState {
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

impl MacState {
    fn new(algorithm: Algorithm, key: &[u8]) -> Result<Self, ConfigurationError> {
        match algorithm {
            Algorithm::Sha256 => Hmac::<Sha256>::new_from_slice(key)
                .map(MacState::Sha256)
                .map_err(|_| ConfigurationError::InvalidSecret),
            Algorithm::Sha512 => Hmac::<Sha512>::new_from_slice(key)
                .map(MacState::Sha512)
                .map_err(|_| ConfigurationError::InvalidSecret),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            MacState::Sha256(mac) => mac.update(data),
            MacState::Sha512(mac) => mac.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            MacState::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
            MacState::Sha512(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }

    /// Constant-time comparison against `tag`.
    fn verify(self, tag: &[u8]) -> bool {
        match self {
            MacState::Sha256(mac) => mac.verify_slice(tag).is_ok(),
            MacState::Sha512(mac) => mac.verify_slice(tag).is_ok(),
        }
    }
}

/// Borrowed inputs for one MAC computation.
pub(crate) struct MacInput<'a> {
    pub key: &'a [u8],
    pub algorithm: Algorithm,
    pub context: SignContext,
    pub binding: &'a [&'a [u8]],
    pub canonical: &'a [u8],
}

impl MacInput<'_> {
    fn state(&self) -> Result<MacState, ConfigurationError> {
        let mut state = MacState::new(self.algorithm, self.key)?;
        state.update(self.context.label());
        state.update(&[0x00]);
        for part in self.binding {
            state.update(part);
        }
        state.update(self.canonical);
        Ok(state)
    }

    pub fn sign(&self) -> Result<Signature, ConfigurationError> {
        Ok(Signature::from_bytes(self.state()?.finalize()))
    }

    pub fn verify(&self, signature: &Signature) -> Result<(), HmacError> {
        if self.state()?.verify(signature.as_bytes()) {
            Ok(())
        } else {
            Err(AuthenticationFailure::SignatureMismatch.into())
        }
    }
}
