//! Stateless nonce replay guard.
//!
//! Remembers `(keyId, nonce)` pairs for a retention window so a captured
//! stateless request cannot be replayed. Entries are kept in insertion
//! order; with a constant retention that is also expiry order, so pruning
//! only ever looks at the front.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::{NONCE_REGISTRY_CAPACITY, NONCE_RETENTION};
use crate::crypto::{KeyId, Nonce};

type Entry = (String, String);

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<Entry>,
    order: VecDeque<(Instant, Entry)>,
}

/// Shared registry of recently used nonces.
#[derive(Debug)]
pub struct NonceRegistry {
    retention: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl NonceRegistry {
    /// Registry with the default retention and capacity.
    pub fn new() -> Self {
        Self::with_limits(NONCE_RETENTION, NONCE_REGISTRY_CAPACITY)
    }

    /// Registry with explicit limits.
    pub fn with_limits(retention: Duration, capacity: usize) -> Self {
        Self {
            retention,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record a nonce. Returns `false` if it was already seen within the
    /// retention window.
    pub fn register(&self, key_id: &KeyId, nonce: &Nonce) -> bool {
        let now = Instant::now();
        let entry = (key_id.as_str().to_owned(), nonce.as_str().to_owned());

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.prune(&mut inner, now);

        if inner.seen.contains(&entry) {
            return false;
        }
        if inner.order.len() >= self.capacity {
            warn!(capacity = self.capacity, "nonce registry full, evicting oldest entry");
            if let Some((_, oldest)) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(entry.clone());
        inner.order.push_back((now, entry));
        true
    }

    /// Number of remembered nonces.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.prune(&mut inner, Instant::now());
        inner.order.len()
    }

    /// Whether no nonce is remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some((at, _)) = inner.order.front() {
            if now.duration_since(*at) < self.retention {
                break;
            }
            if let Some((_, entry)) = inner.order.pop_front() {
                inner.seen.remove(&entry);
            }
        }
    }
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
