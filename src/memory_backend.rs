//! In-Memory Backend Module
//!
//! Process-local implementation of the key-value backend capability, used by
//! tests and local development runs where no remote store is available.
//! Expiry is enforced lazily: expired entries are dropped when touched.

use crate::backend::KeyValueBackend;
use crate::{Result, ServiceError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(deadline) if Instant::now() >= deadline)
    }
}

/// In-process key-value store with per-key expiry
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredValue>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch a live value, dropping it if expired
    fn live_value(&self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Some(entry.data.clone()),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn adjust_counter(&self, key: &str, amount: i64) -> Result<i64> {
        // Entry API keeps read-modify-write atomic per key
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue {
                data: b"0".to_vec(),
                expires_at: None,
            });

        if entry.is_expired() {
            entry.data = b"0".to_vec();
            entry.expires_at = None;
        }

        let current: i64 = std::str::from_utf8(&entry.data)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                ServiceError::BackendError(format!(
                    "value at key '{}' is not an integer",
                    key
                ))
            })?;

        let next = current + amount;
        entry.data = next.to_string().into_bytes();
        Ok(next)
    }
}

/// Glob matcher supporting `*` (any run) and `?` (any single character)
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // Iterative matcher with backtracking over the most recent `*`
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0u64;
        for key in keys {
            if let Some((_, value)) = self.entries.remove(key) {
                if !value.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => Ok(-2),
            Some(entry) => match entry.expires_at {
                Some(deadline) => Ok(deadline.saturating_duration_since(Instant::now()).as_secs() as i64),
                None => Ok(-1),
            },
            None => Ok(-2),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut matches: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired() && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        matches.sort();
        Ok(matches)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        Ok(keys.iter().map(|key| self.live_value(key)).collect())
    }

    async fn mset(&self, entries: Vec<(String, Vec<u8>, Option<Duration>)>) -> Result<()> {
        for (key, value, ttl) in entries {
            match ttl {
                Some(ttl) => self.set_with_ttl(&key, value, ttl).await?,
                None => self.set(&key, value).await?,
            }
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.adjust_counter(key, amount)
    }

    async fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.adjust_counter(key, -amount)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        debug!("In-memory backend disconnect is a no-op");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory ({} entries)", self.entries.len())
    }
}
