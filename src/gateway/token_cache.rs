use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Bearer token with its usable lifetime
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    pub fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory access token cache keyed by credential pair.
/// Secrets are never held as keys, only their SHA-256 digest.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    tokens: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for(client_id: &str, client_secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(client_id.as_bytes());
        hasher.update(b":");
        hasher.update(client_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let tokens = self.tokens.read();
        match tokens.get(key) {
            Some(token) if token.is_valid(Instant::now()) => {
                debug!("✓ Gateway token cache hit");
                Some(token.access_token.clone())
            }
            _ => None,
        }
    }

    /// Store a token reported to live `expires_in`, shortened by `margin`.
    /// Tokens that would already be expired after the margin are not stored.
    pub fn insert(&self, key: String, access_token: String, expires_in: Duration, margin: Duration) {
        let Some(lifetime) = expires_in.checked_sub(margin) else {
            return;
        };
        if lifetime.is_zero() {
            return;
        }
        self.tokens.write().insert(
            key,
            CachedToken {
                access_token,
                expires_at: Instant::now() + lifetime,
            },
        );
    }

    pub fn evict(&self, key: &str) {
        self.tokens.write().remove(key);
    }
}
