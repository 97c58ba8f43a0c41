//! Deterministic write deduplication (spec.md §3, §4.A).
//! Grounded on `examples/original_source/src/grinder/connectors/idempotency.py`.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    Inflight,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyEntry {
    pub key: String,
    pub status: IdempotencyStatus,
    pub op_name: String,
    pub request_fingerprint: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub cached_result: Option<serde_json::Value>,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyStats {
    pub hits: u64,
    pub misses: u64,
    pub conflicts: u64,
    pub expirations: u64,
}

/// A value that can appear in the canonical-JSON payload hashed into an
/// idempotency key or fingerprint. `Decimal` values are rendered via
/// `normalize()` so trailing zeros never change the hash.
#[derive(Debug, Clone)]
pub enum KeyParam {
    Str(String),
    Decimal(Decimal),
    Int(i64),
    Bool(bool),
}

impl KeyParam {
    fn canonical(&self) -> String {
        match self {
            KeyParam::Str(s) => s.clone(),
            KeyParam::Decimal(d) => d.normalize().to_string(),
            KeyParam::Int(i) => i.to_string(),
            KeyParam::Bool(b) => b.to_string(),
        }
    }
}

fn canonical_json(params: &BTreeMap<String, KeyParam>) -> String {
    let mut map = serde_json::Map::new();
    for (k, v) in params {
        map.insert(k.clone(), serde_json::Value::String(v.canonical()));
    }
    serde_json::Value::Object(map).to_string()
}

/// Key format `"{scope}:{op}:{hex32}"`, hex32 = first 32 hex chars of the
/// SHA-256 of the sorted-key canonical JSON of `params`.
pub fn compute_idempotency_key(
    scope: &str,
    op: &str,
    params: &BTreeMap<String, KeyParam>,
) -> String {
    let canonical = canonical_json(params);
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{scope}:{op}:{}", &digest[..32])
}

/// Shorter hash for detecting parameter drift under a reused key.
pub fn compute_request_fingerprint(params: &BTreeMap<String, KeyParam>) -> String {
    let canonical = canonical_json(params);
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    digest[..16].to_string()
}

/// Thread-safe idempotency ledger for order writes.
pub struct IdempotencyStore {
    entries: DashMap<String, IdempotencyEntry>,
    stats: parking_lot::Mutex<IdempotencyStats>,
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: parking_lot::Mutex::new(IdempotencyStats::default()),
        }
    }

    pub fn stats(&self) -> IdempotencyStats {
        *self.stats.lock()
    }

    /// Returns the entry, removing and counting it as an expiration if its
    /// TTL has lapsed as of `now_ms`.
    pub fn get(&self, key: &str, now_ms: i64) -> Option<IdempotencyEntry> {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.expires_at_ms <= now_ms)
            .unwrap_or(false);
        if expired {
            self.entries.remove(key);
            self.stats.lock().expirations += 1;
            return None;
        }
        self.entries.get(key).map(|e| e.clone())
    }

    /// Stores `entry` if the key is absent, expired, or `FAILED`. Returns
    /// `false` for an active `INFLIGHT` (counted as conflict) or `DONE`
    /// (counted as hit) entry.
    pub fn put_if_absent(
        &self,
        key: &str,
        mut entry: IdempotencyEntry,
        ttl_s: i64,
        now_ms: i64,
    ) -> bool {
        if let Some(existing) = self.entries.get(key) {
            if existing.expires_at_ms > now_ms {
                match existing.status {
                    IdempotencyStatus::Failed => {}
                    IdempotencyStatus::Inflight => {
                        self.stats.lock().conflicts += 1;
                        return false;
                    }
                    IdempotencyStatus::Done => {
                        self.stats.lock().hits += 1;
                        return false;
                    }
                }
            } else {
                self.stats.lock().expirations += 1;
            }
        }

        entry.key = key.to_string();
        entry.created_at_ms = now_ms;
        entry.expires_at_ms = now_ms + ttl_s * 1000;
        self.entries.insert(key.to_string(), entry);
        self.stats.lock().misses += 1;
        true
    }

    /// Transitions to `DONE`, extending the TTL and caching `result`.
    pub fn mark_done(&self, key: &str, result: serde_json::Value, done_ttl_s: i64, now_ms: i64) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.status = IdempotencyStatus::Done;
            entry.cached_result = Some(result);
            entry.error_code = None;
            entry.expires_at_ms = now_ms + done_ttl_s * 1000;
        }
    }

    /// Transitions to `FAILED`, preserving the original expiry so a retry
    /// past that point starts fresh rather than looping forever.
    pub fn mark_failed(&self, key: &str, error_code: impl Into<String>) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.status = IdempotencyStatus::Failed;
            entry.cached_result = None;
            entry.error_code = Some(error_code.into());
        }
    }

    pub fn purge_expired(&self, now_ms: i64) -> u64 {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at_ms <= now_ms)
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        let count = expired.len() as u64;
        self.stats.lock().expirations += count;
        count
    }
}
