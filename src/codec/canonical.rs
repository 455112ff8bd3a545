//! Canonical message construction.
//!
//! Produces the exact bytes each message kind is signed over:
//!
//! | Kind | Bytes |
//! |---|---|
//! | request (stateless, handshake, session) | `METHOD \|\| URI \|\| BODY` |
//! | response (stateless, session) | `BODY` |
//! | URI-mode request | `URI` |
//! | session establish response | `Nonce2` |
//!
//! No normalization is applied. Both parties must observe byte-identical
//! inputs. The URI is the origin-form request target (path and query) as
//! transmitted.

use http::Uri;

use crate::crypto::Nonce;

/// The content a signature covers.
#[derive(Debug, Clone, Copy)]
pub enum CanonicalMessage<'a> {
    /// `METHOD || URI || BODY`.
    Request {
        /// Method exactly as transmitted.
        method: &'a str,
        /// Origin-form request target.
        uri: &'a str,
        /// Raw request payload.
        body: &'a [u8],
    },
    /// `BODY`.
    Response {
        /// Raw response payload.
        body: &'a [u8],
    },
    /// `URI`, for tokens carried in the query string.
    Uri {
        /// Origin-form request target without the token parameter.
        uri: &'a str,
    },
    /// The server's Nonce2.
    Nonce2(&'a Nonce),
}

impl CanonicalMessage<'_> {
    /// Serialize to the bytes to sign.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            CanonicalMessage::Request { method, uri, body } => {
                let mut out = Vec::with_capacity(method.len() + uri.len() + body.len());
                out.extend_from_slice(method.as_bytes());
                out.extend_from_slice(uri.as_bytes());
                out.extend_from_slice(body);
                out
            }
            CanonicalMessage::Response { body } => body.to_vec(),
            CanonicalMessage::Uri { uri } => uri.as_bytes().to_vec(),
            CanonicalMessage::Nonce2(nonce2) => nonce2.as_str().as_bytes().to_vec(),
        }
    }
}

/// Origin-form request target of `uri` (`/path?query`).
///
/// Absolute URIs lose their scheme and authority. An empty path becomes `/`.
pub fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}
