//! Authentication token codec.
//!
//! Tokens are `:`-delimited with the version first:
//!
//! | Kind | Fields |
//! |---|---|
//! | request (stateless, URI mode, handshake) | `version:keyId:nonce:signature` |
//! | response (stateless) | `version:signature` |
//! | session establish response | `version:nonce2:signature` |
//! | session message (either direction) | `version:signature` |
//!
//! Decoding is strict. The field count must match the expected kind
//! exactly, no field may be empty (so trailing separators are rejected),
//! and the version must equal [`PROTOCOL_VERSION`].

use std::fmt;

use crate::core::{PROTOCOL_VERSION, ProtocolError, TOKEN_SEPARATOR};
use crate::crypto::{KeyId, Nonce, Signature};

/// Token shape to expect when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `version:keyId:nonce:signature`.
    Request,
    /// `version:signature`.
    Response,
    /// `version:nonce2:signature`.
    SessionEstablish,
    /// `version:signature`.
    SessionMessage,
}

impl TokenKind {
    /// Number of fields in this kind of token.
    pub fn field_count(self) -> usize {
        match self {
            TokenKind::Request => 4,
            TokenKind::SessionEstablish => 3,
            TokenKind::Response | TokenKind::SessionMessage => 2,
        }
    }
}

/// A decoded authentication token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// Stateless, URI-mode or handshake request.
    Request {
        /// Key id of the signer.
        key_id: KeyId,
        /// Client nonce.
        nonce: Nonce,
        /// Request signature.
        signature: Signature,
    },
    /// Stateless response.
    Response {
        /// Response signature.
        signature: Signature,
    },
    /// Handshake response.
    SessionEstablish {
        /// Server-issued Nonce2.
        nonce2: Nonce,
        /// Signature over Nonce2.
        signature: Signature,
    },
    /// Session message in either direction.
    SessionMessage {
        /// Message signature.
        signature: Signature,
    },
}

impl AuthToken {
    /// Kind of this token.
    pub fn kind(&self) -> TokenKind {
        match self {
            AuthToken::Request { .. } => TokenKind::Request,
            AuthToken::Response { .. } => TokenKind::Response,
            AuthToken::SessionEstablish { .. } => TokenKind::SessionEstablish,
            AuthToken::SessionMessage { .. } => TokenKind::SessionMessage,
        }
    }

    /// Signature carried by the token.
    pub fn signature(&self) -> &Signature {
        match self {
            AuthToken::Request { signature, .. }
            | AuthToken::Response { signature }
            | AuthToken::SessionEstablish { signature, .. }
            | AuthToken::SessionMessage { signature } => signature,
        }
    }

    /// Encode to the wire string.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a wire string, expecting `kind`.
    pub fn decode(kind: TokenKind, value: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = value.split(TOKEN_SEPARATOR).collect();
        if fields.len() != kind.field_count() {
            return Err(ProtocolError::FieldCount {
                expected: kind.field_count(),
                actual: fields.len(),
            });
        }
        if let Some(index) = fields.iter().position(|f| f.is_empty()) {
            return Err(ProtocolError::EmptyField(index));
        }

        check_version(fields[0])?;

        let token = match kind {
            TokenKind::Request => AuthToken::Request {
                key_id: KeyId::new(fields[1])?,
                nonce: Nonce::parse(fields[2])?,
                signature: Signature::from_hex(fields[3])?,
            },
            TokenKind::Response => AuthToken::Response {
                signature: Signature::from_hex(fields[1])?,
            },
            TokenKind::SessionEstablish => AuthToken::SessionEstablish {
                nonce2: Nonce::parse(fields[1])?,
                signature: Signature::from_hex(fields[2])?,
            },
            TokenKind::SessionMessage => AuthToken::SessionMessage {
                signature: Signature::from_hex(fields[1])?,
            },
        };
        Ok(token)
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = TOKEN_SEPARATOR;
        write!(f, "{PROTOCOL_VERSION}")?;
        match self {
            AuthToken::Request {
                key_id,
                nonce,
                signature,
            } => write!(f, "{sep}{key_id}{sep}{nonce}{sep}{}", signature.to_hex()),
            AuthToken::SessionEstablish { nonce2, signature } => {
                write!(f, "{sep}{nonce2}{sep}{}", signature.to_hex())
            }
            AuthToken::Response { signature } | AuthToken::SessionMessage { signature } => {
                write!(f, "{sep}{}", signature.to_hex())
            }
        }
    }
}

fn check_version(field: &str) -> Result<(), ProtocolError> {
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::MalformedVersion(field.to_owned()));
    }
    let actual: u32 = field
        .parse()
        .map_err(|_| ProtocolError::MalformedVersion(field.to_owned()))?;
    if actual != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual,
        });
    }
    Ok(())
}
