//! In-memory key provider.

use std::collections::HashMap;

use crate::core::{ConfigurationError, KeyProvider};
use crate::crypto::{KeyId, KeyMaterial};

/// Key material held in memory, grouped by provider entry.
///
/// # Example
///
/// ```
/// use sphinx_hmac::core::KeyProvider;
/// use sphinx_hmac::crypto::{Algorithm, KeyId, KeyMaterial, Secret};
/// use sphinx_hmac::server::StaticKeyProvider;
///
/// let app = KeyId::new("app").unwrap();
/// let provider = StaticKeyProvider::new().with_key(
///     "partners",
///     KeyMaterial::new(app.clone(), Secret::new(b"s3cret".to_vec()), Algorithm::Sha256),
/// );
///
/// assert!(provider.lookup("partners", &app).unwrap().is_some());
/// assert!(provider.lookup("internal", &app).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticKeyProvider {
    entries: HashMap<String, HashMap<String, KeyMaterial>>,
}

impl StaticKeyProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add key material under `entry` (builder style).
    pub fn with_key(mut self, entry: impl Into<String>, material: KeyMaterial) -> Self {
        self.insert(entry, material);
        self
    }

    /// Add key material under `entry`, replacing any with the same key id.
    pub fn insert(&mut self, entry: impl Into<String>, material: KeyMaterial) {
        self.entries
            .entry(entry.into())
            .or_default()
            .insert(material.key_id().as_str().to_owned(), material);
    }
}

impl KeyProvider for StaticKeyProvider {
    fn lookup(
        &self,
        selector: &str,
        key_id: &KeyId,
    ) -> Result<Option<KeyMaterial>, ConfigurationError> {
        let keys = self
            .entries
            .get(selector)
            .ok_or_else(|| ConfigurationError::UnknownProvider(selector.to_owned()))?;
        Ok(keys.get(key_id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, Secret};

    #[test]
    fn test_lookup() {
        let mut provider = StaticKeyProvider::new();
        provider.insert(
            "partners",
            KeyMaterial::new(
                KeyId::new("a").unwrap(),
                Secret::new(b"one".to_vec()),
                Algorithm::Sha512,
            ),
        );

        let found = provider
            .lookup("partners", &KeyId::new("a").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.algorithm(), Algorithm::Sha512);

        assert!(provider
            .lookup("partners", &KeyId::new("b").unwrap())
            .unwrap()
            .is_none());
        assert_eq!(
            provider.lookup("other", &KeyId::new("a").unwrap()).unwrap_err(),
            ConfigurationError::UnknownProvider("other".into())
        );
    }
}
