//! Key material, identifiers and nonces.

use std::fmt;

use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{
    ConfigurationError, NONCE_SIZE, ProtocolError, SESSION_KEY_INFO, SESSION_KEY_SIZE,
    TOKEN_SEPARATOR,
};

/// Shared secret bytes.
///
/// Zeroized on drop. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Secret {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Identifier of the secret/application in use.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    /// Create a key id. Empty ids and ids containing `:` are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        if id.is_empty() || id.contains(TOKEN_SEPARATOR) || !is_visible_ascii(&id) {
            return Err(ProtocolError::MalformedKeyId);
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use random value (client nonce or server Nonce2).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parse a nonce received on the wire.
    ///
    /// Any non-empty visible-ASCII string without `:` is accepted, so peers
    /// may use their own nonce format.
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        if value.is_empty() || value.contains(TOKEN_SEPARATOR) || !is_visible_ascii(value) {
            return Err(ProtocolError::MalformedNonce);
        }
        Ok(Self(value.to_owned()))
    }

    /// The nonce as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// MAC digest, hex-encoded on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode a hex signature field.
    pub fn from_hex(value: &str) -> Result<Self, ProtocolError> {
        hex::decode(value)
            .map(Self)
            .map_err(|_| ProtocolError::MalformedSignature)
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

/// Keyed-hash algorithm. Both sides agree on it out of band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// HMAC with SHA-256.
    #[default]
    Sha256,
    /// HMAC with SHA-512.
    Sha512,
}

impl Algorithm {
    /// Human-readable description reported to clients on failure.
    pub fn description(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "HMAC-SHA256",
            Algorithm::Sha512 => "HMAC-SHA512",
        }
    }
}

/// Everything needed to build an engine for one key id.
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    key_id: KeyId,
    secret: Secret,
    algorithm: Algorithm,
}

impl KeyMaterial {
    /// Bundle a key id with its secret and algorithm.
    pub fn new(key_id: KeyId, secret: Secret, algorithm: Algorithm) -> Self {
        Self {
            key_id,
            secret,
            algorithm,
        }
    }

    /// The key id.
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// The algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn into_parts(self) -> (KeyId, Secret, Algorithm) {
        (self.key_id, self.secret, self.algorithm)
    }
}

/// Per-session MAC key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Derive the session key from the shared secret and both nonces.
    ///
    /// `HKDF-SHA256(ikm = secret, salt = nonce || ":" || nonce2)`
    pub fn derive(secret: &Secret, nonce: &Nonce, nonce2: &Nonce) -> Result<Self, ConfigurationError> {
        let mut salt = Vec::with_capacity(nonce.as_str().len() + nonce2.as_str().len() + 1);
        salt.extend_from_slice(nonce.as_str().as_bytes());
        salt.push(TOKEN_SEPARATOR as u8);
        salt.extend_from_slice(nonce2.as_str().as_bytes());

        let hk = Hkdf::<Sha256>::new(Some(&salt), secret.expose());
        let mut okm = [0u8; SESSION_KEY_SIZE];
        hk.expand(SESSION_KEY_INFO, &mut okm)
            .map_err(|_| ConfigurationError::InvalidSecret)?;
        Ok(Self(okm))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

fn is_visible_ascii(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_generation() {
        let n1 = Nonce::generate();
        let n2 = Nonce::generate();

        // Nonces should be different (with overwhelming probability)
        assert_ne!(n1, n2);
        assert_eq!(n1.as_str().len(), NONCE_SIZE * 2);
    }

    #[test]
    fn test_nonce_parse_rejects_separator() {
        assert!(Nonce::parse("abc").is_ok());
        assert_eq!(Nonce::parse("a:b"), Err(ProtocolError::MalformedNonce));
        assert_eq!(Nonce::parse(""), Err(ProtocolError::MalformedNonce));
        assert_eq!(Nonce::parse("a b"), Err(ProtocolError::MalformedNonce));
    }

    #[test]
    fn test_key_id_validation() {
        assert!(KeyId::new("app-1").is_ok());
        assert_eq!(KeyId::new(""), Err(ProtocolError::MalformedKeyId));
        assert_eq!(KeyId::new("a:b"), Err(ProtocolError::MalformedKeyId));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new(b"hunter2".to_vec());
        assert_eq!(format!("{:?}", secret), "Secret(<redacted>)");
    }

    #[test]
    fn test_signature_hex() {
        let sig = Signature::from_hex("00ff10").unwrap();
        assert_eq!(sig.as_bytes(), &[0x00, 0xff, 0x10]);
        assert_eq!(sig.to_hex(), "00ff10");
        assert_eq!(
            Signature::from_hex("zz"),
            Err(ProtocolError::MalformedSignature)
        );
    }

    #[test]
    fn test_session_key_depends_on_both_nonces() {
        let secret = Secret::new(b"secret".to_vec());
        let a = Nonce::parse("aaaa").unwrap();
        let b = Nonce::parse("bbbb").unwrap();
        let c = Nonce::parse("cccc").unwrap();

        let k1 = SessionKey::derive(&secret, &a, &b).unwrap();
        let k2 = SessionKey::derive(&secret, &a, &b).unwrap();
        let k3 = SessionKey::derive(&secret, &a, &c).unwrap();

        assert_eq!(k1.expose(), k2.expose());
        assert_ne!(k1.expose(), k3.expose());
    }
}
