//! Protocol constants shared by client and server.
//!
//! These values are part of the wire contract and MUST NOT be changed
//! without bumping [`PROTOCOL_VERSION`].

use std::time::Duration;

// =============================================================================
// WIRE NAMES
// =============================================================================

/// Header carrying the authentication token in header and session modes.
pub const HEADER_NAME: &str = "HMAC-Authentication";

/// Header carrying the client nonce of an established session.
///
/// Session tokens are `version:signature` only, so the server needs this
/// to locate the session the message belongs to.
pub const SESSION_HEADER_NAME: &str = "HMAC-Session";

/// Query parameter carrying the authentication token in URI mode.
pub const URI_PARAM_NAME: &str = "hmac";

/// Token field separator.
pub const TOKEN_SEPARATOR: char = ':';

/// Protocol version carried as the first field of every token.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Random bytes in a nonce (hex-encoded on the wire, so twice as many chars).
pub const NONCE_SIZE: usize = 16;

/// Derived session key size.
pub const SESSION_KEY_SIZE: usize = 32;

/// HKDF info string for session key derivation.
pub const SESSION_KEY_INFO: &[u8] = b"sphinx-hmac session key v1";

// =============================================================================
// ERROR BODY (application/problem+json)
// =============================================================================

/// Content type of the structured unauthenticated response.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Problem type URI clients key their diagnostics off.
pub const PROBLEM_TYPE: &str = "https://github.com/reinaldoborges/rb-sphinx-hmac-zf2/wiki";

/// Problem title for authentication failures.
pub const PROBLEM_TITLE: &str = "Unauthorized";

// =============================================================================
// TIMING
// =============================================================================

/// Default client request timeout (handshake and message alike).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the server remembers a stateless nonce.
pub const NONCE_RETENTION: Duration = Duration::from_secs(300);

/// Upper bound on remembered nonces before the oldest are evicted.
pub const NONCE_REGISTRY_CAPACITY: usize = 65_536;

/// Idle time after which an established server session is dropped.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(900);

/// Upper bound on established server sessions.
pub const SESSION_REGISTRY_CAPACITY: usize = 10_000;

/// Maximum request/response body the axum middleware buffers for signing.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;
