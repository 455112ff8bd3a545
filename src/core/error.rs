//! Error types for the HMAC protocol.
//!
//! Every failure is typed. Nothing in this crate turns a failed check into
//! a partially trusted result.

use thiserror::Error;

use crate::crypto::SessionPhase;

/// Malformed or out-of-contract wire data, and misuse of a single-use engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The token header or query parameter was absent.
    #[error("missing {0}")]
    MissingToken(String),

    /// Token field count did not match the expected mode.
    #[error("malformed token: expected {expected} fields, got {actual}")]
    FieldCount {
        /// Expected number of fields.
        expected: usize,
        /// Number of fields received.
        actual: usize,
    },

    /// A token field was empty.
    #[error("malformed token: field {0} is empty")]
    EmptyField(usize),

    /// The version field was not a number.
    #[error("malformed version: {0:?}")]
    MalformedVersion(String),

    /// The version field did not equal the codec's version.
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this codec speaks.
        expected: u32,
        /// Version received.
        actual: u32,
    },

    /// A signature field was not valid hex.
    #[error("malformed signature")]
    MalformedSignature,

    /// A nonce field contained characters outside the token alphabet.
    #[error("malformed nonce")]
    MalformedNonce,

    /// A key id field contained the token separator or was empty.
    #[error("malformed key id")]
    MalformedKeyId,

    /// A header value was not valid visible ASCII.
    #[error("malformed header value")]
    MalformedHeader,

    /// The token query parameter was present but not last.
    #[error("the {0} query parameter must be the last parameter")]
    TokenNotLast(&'static str),

    /// A stateless engine was asked to handle a second request.
    #[error("stateless engine already used for one request")]
    EngineReused,

    /// A responder engine was used before the client nonce was bound.
    #[error("no nonce bound to engine")]
    NonceNotBound,

    /// The engine already has a nonce.
    #[error("nonce already bound to engine")]
    NonceAlreadyBound,
}

/// An operation was attempted in the wrong session phase.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionStateError {
    /// The engine was built for stateless use.
    #[error("engine is not session-capable")]
    NotSessionCapable,

    /// A session message was signed or verified before establishment.
    #[error("session not established (phase: {0})")]
    NotEstablished(SessionPhase),

    /// `start_session` was called on an established session.
    #[error("session already established")]
    AlreadyEstablished,

    /// The session was terminated; a new engine is required.
    #[error("session terminated")]
    Terminated,

    /// The handshake was started twice.
    #[error("handshake already in progress (phase: {0})")]
    HandshakeInProgress(SessionPhase),

    /// The sequence counter cannot advance any further.
    #[error("session sequence counter exhausted")]
    SequenceExhausted,
}

/// Missing or invalid selector, adapter, or secret binding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No engine was bound to the client.
    #[error("HMAC engine is required for the request")]
    MissingEngine,

    /// The server was built without a key provider.
    #[error("HMAC key provider is required")]
    MissingKeyProvider,

    /// No selector configured for the route.
    #[error("HMAC selector not defined for controller {0}")]
    MissingSelector(String),

    /// The selector is not listed in the selector map.
    #[error("HMAC selector not defined in configuration: {0}")]
    UnknownSelector(String),

    /// The selector maps to an empty provider key.
    #[error("HMAC selector not mapped: {0}")]
    UnmappedSelector(String),

    /// No adapter configured for the route.
    #[error("HMAC adapter not defined for controller {0}")]
    MissingAdapter(String),

    /// The adapter name is not one of the known variants.
    #[error("HMAC adapter not defined: {0}")]
    UnknownAdapter(String),

    /// The key provider has no entry for the provider key.
    #[error("no key provider entry for {0}")]
    UnknownProvider(String),

    /// Secret material could not be used as a MAC key.
    #[error("invalid secret")]
    InvalidSecret,
}

/// Signature mismatch or unresolvable identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticationFailure {
    /// The recomputed digest did not match.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The key id is not known to the provider.
    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    /// The token's key id does not belong to this engine.
    #[error("key id mismatch")]
    KeyIdMismatch,

    /// The nonce was already used.
    #[error("nonce already used")]
    ReplayedNonce,

    /// No established session matches the session header.
    #[error("unknown or expired session")]
    UnknownSession,
}

/// Top-level HMAC errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HmacError {
    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session state error.
    #[error("session state error: {0}")]
    Session(#[from] SessionStateError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Authentication failure.
    #[error("authentication failure: {0}")]
    Authentication(#[from] AuthenticationFailure),
}

impl HmacError {
    /// Whether this is a configuration error (fatal, operator-facing).
    pub fn is_configuration(&self) -> bool {
        matches!(self, HmacError::Configuration(_))
    }
}

/// Errors raised by an [`HttpTransport`](super::HttpTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Other(String),
}
