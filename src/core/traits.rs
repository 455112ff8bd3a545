//! Interfaces the protocol core consumes.
//!
//! Secret provisioning and HTTP transport are external collaborators. The
//! core only sees them through these traits.

use std::future::Future;

use http::{Request, Response};

use super::error::{ConfigurationError, TransportError};
use crate::crypto::{KeyId, KeyMaterial};

/// Resolves a selector and key id to the key material an engine is built from.
///
/// Implementations are shared across concurrent requests and MUST be safe
/// for concurrent reads.
///
/// # Contract
///
/// - `Err(_)`: the selector itself is unknown (configuration error, fatal)
/// - `Ok(None)`: the selector is known but has no such key id
///   (authentication failure)
///
/// # Example
///
/// ```
/// use sphinx_hmac::core::{ConfigurationError, KeyProvider};
/// use sphinx_hmac::crypto::{Algorithm, KeyId, KeyMaterial, Secret};
///
/// struct Single(KeyMaterial);
///
/// impl KeyProvider for Single {
///     fn lookup(
///         &self,
///         _selector: &str,
///         key_id: &KeyId,
///     ) -> Result<Option<KeyMaterial>, ConfigurationError> {
///         Ok((key_id == self.0.key_id()).then(|| self.0.clone()))
///     }
/// }
///
/// let provider = Single(KeyMaterial::new(
///     KeyId::new("app").unwrap(),
///     Secret::new(b"shared secret".to_vec()),
///     Algorithm::Sha256,
/// ));
/// let found = provider.lookup("default", &KeyId::new("app").unwrap()).unwrap();
/// assert!(found.is_some());
/// ```
pub trait KeyProvider: Send + Sync {
    /// Look up key material for `key_id` under `selector`.
    fn lookup(
        &self,
        selector: &str,
        key_id: &KeyId,
    ) -> Result<Option<KeyMaterial>, ConfigurationError>;
}

/// Sends a fully-built request and returns the raw response.
///
/// Connection reuse, TLS and status handling belong to the implementation.
pub trait HttpTransport: Send + Sync {
    /// Send `request` and return the response with its body buffered.
    fn send(
        &self,
        request: Request<Vec<u8>>,
    ) -> impl Future<Output = Result<Response<Vec<u8>>, TransportError>> + Send;
}
