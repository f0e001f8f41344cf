use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

struct CacheEntry {
    value: Value,
    /// School the cached result was filtered to; `None` covers every school.
    school_id: Option<i64>,
    stored_at: Instant,
}

/// In-memory TTL cache for computed dashboard payloads.
#[derive(Clone)]
pub struct DashboardCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl DashboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: impl Into<String>, school_id: Option<i64>, value: Value) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                school_id,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry that may include data of the school.
    pub async fn invalidate_school(&self, school_id: i64) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| matches!(entry.school_id, Some(id) if id != school_id));
        debug!(
            "Invalidated {} dashboard cache entr(ies) for school {}",
            before - entries.len(),
            school_id
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
