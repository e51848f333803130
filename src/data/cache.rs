use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use alloy::primitives::{B256, keccak256};
use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::data::types::Envelope;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Memoizes operation results by `fingerprint(method, params)`.
///
/// Entries are evicted least-recently-used once `capacity` is reached and,
/// when a TTL is set, dropped on the first read after they expire. Failure
/// envelopes are only stored when `cache_failures` is on.
pub struct RequestCache {
    entries: Mutex<LruCache<B256, (Instant, Envelope<Value>)>>,
    ttl: Option<Duration>,
    cache_failures: bool,
}

impl RequestCache {
    pub fn new(capacity: usize, ttl: Option<Duration>, cache_failures: bool) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            cache_failures,
        }
    }

    /// Return the stored envelope for `(method, params)`, or run `operation`
    /// and store what it returns.
    pub async fn process<F>(&self, method: &str, params: &Value, operation: F) -> Envelope<Value>
    where
        F: Future<Output = Envelope<Value>>,
    {
        let key = fingerprint(method, params);
        if let Some(hit) = self.get(&key).await {
            info!(method, fingerprint = %key, "Request cache hit.");
            return hit;
        }
        info!(method, fingerprint = %key, "Request cache miss.");

        let envelope = operation.await;
        if envelope.is_failure() && !self.cache_failures {
            debug!(method, status = envelope.status, "Failure not cached.");
        } else {
            self.entries
                .lock()
                .await
                .put(key, (Instant::now(), envelope.clone()));
        }
        envelope
    }

    async fn get(&self, key: &B256) -> Option<Envelope<Value>> {
        let mut entries = self.entries.lock().await;
        let (stored_at, envelope) = entries.get(key)?;
        if self.ttl.is_some_and(|ttl| stored_at.elapsed() >= ttl) {
            entries.pop(key);
            return None;
        }
        Some(envelope.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// keccak-256 over `method`, a zero byte, and the canonical JSON of `params`.
pub fn fingerprint(method: &str, params: &Value) -> B256 {
    let mut preimage = Vec::with_capacity(method.len() + 64);
    preimage.extend_from_slice(method.as_bytes());
    preimage.push(0);
    write_canonical(params, &mut preimage);
    keccak256(&preimage)
}

/// Compact JSON with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}
