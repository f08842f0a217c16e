// src/cache.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ethers::types::H256;
use tokio::sync::RwLock;

use crate::types::ProcessingResult;

/// Best-effort store of finished results, keyed by operation hash.
///
/// Callers treat every error as a miss, so implementations are free to fail.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: H256) -> anyhow::Result<Option<ProcessingResult>>;

    async fn put(&self, key: H256, value: &ProcessingResult) -> anyhow::Result<()>;
}

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// In-process cache holding serialized results until their TTL runs out.
/// Once full, the oldest entry makes room for a new key.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<H256, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drops every expired entry.
    pub async fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .write()
            .await
            .retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: H256) -> anyhow::Result<Option<ProcessingResult>> {
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some((stored_at, serialized)) if stored_at.elapsed() < self.ttl => {
                Ok(Some(serde_json::from_str(serialized)?))
            }
            _ => Ok(None),
        }
    }

    async fn put(&self, key: H256, value: &ProcessingResult) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(value)?;
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        while entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored_at, _))| *stored_at)
                .map(|(oldest, _)| *oldest);
            match oldest {
                Some(oldest) => entries.remove(&oldest),
                None => break,
            };
        }
        entries.insert(key, (Instant::now(), serialized));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::PaymasterError;

    fn result() -> ProcessingResult {
        ProcessingResult::failed(
            json!({ "sender": "0x1234567890123456789012345678901234567890" }),
            &PaymasterError::InvalidUserOperation("test".into()),
        )
    }

    #[tokio::test]
    async fn should_return_stored_results() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        let key = H256::repeat_byte(0x01);
        assert!(cache.get(key).await.unwrap().is_none());

        cache.put(key, &result()).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), Some(result()));
        assert!(cache.get(H256::repeat_byte(0x02)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_evict_oldest_when_full() {
        let cache = MemoryCache::with_max_entries(Duration::from_secs(60), 2);
        for byte in 1..=3u8 {
            cache.put(H256::repeat_byte(byte), &result()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(H256::repeat_byte(1)).await.unwrap().is_none());
        assert!(cache.get(H256::repeat_byte(2)).await.unwrap().is_some());
        assert!(cache.get(H256::repeat_byte(3)).await.unwrap().is_some());

        // overwriting a live key never evicts
        cache.put(H256::repeat_byte(3), &result()).await.unwrap();
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(H256::repeat_byte(2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_expire_entries() {
        let cache = MemoryCache::new(Duration::from_millis(10));
        let key = H256::repeat_byte(0x03);
        cache.put(key, &result()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(key).await.unwrap().is_none());
        cache.purge_expired().await;
        assert_eq!(cache.len().await, 0);
    }
}
