//! Negotiated session cache
//!
//! Bounded moka cache keyed by `StreamKey`. Entries live until their signed
//! URL is about to expire, or for the configured TTL when upstream gave no
//! expiration, whichever is sooner. `try_get_with` coalesces concurrent
//! misses for one key into a single negotiation and does not store failures.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::{StreamKey, StreamSession};

struct SessionExpiry {
    ttl: Duration,
}

impl Expiry<StreamKey, Arc<StreamSession>> for SessionExpiry {
    fn expire_after_create(
        &self,
        _key: &StreamKey,
        session: &Arc<StreamSession>,
        _created_at: Instant,
    ) -> Option<Duration> {
        let ttl = match session.time_to_live(SystemTime::now()) {
            Some(signed) => signed.min(self.ttl),
            None => self.ttl,
        };
        Some(ttl)
    }
}

#[derive(Clone)]
pub struct StreamCache {
    sessions: Cache<StreamKey, Arc<StreamSession>>,
}

impl StreamCache {
    pub fn new(max_sessions: u64, ttl: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .expire_after(SessionExpiry { ttl })
            .build();
        Self { sessions }
    }

    /// Cached session for `key`, or the result of `negotiate`. Concurrent
    /// callers for the same key share one `negotiate` run.
    pub async fn get_or_negotiate<F>(
        &self,
        key: &StreamKey,
        negotiate: F,
    ) -> Result<Arc<StreamSession>>
    where
        F: Future<Output = Result<Arc<StreamSession>>>,
    {
        self.sessions
            .try_get_with(key.clone(), negotiate)
            .await
            .map_err(|e: Arc<Error>| (*e).clone())
    }

    pub async fn get(&self, key: &StreamKey) -> Option<Arc<StreamSession>> {
        self.sessions.get(key).await
    }

    pub async fn evict(&self, key: &StreamKey) {
        debug!(stream = %key, "evicting stream session");
        self.sessions.invalidate(key).await;
    }

    /// Approximate; moka applies pending evictions lazily.
    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
