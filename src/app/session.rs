// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use tokio::sync::Mutex;

/// SQL text of recent queries, keyed by `<requestId>_<refId>`.
///
/// The least recently used entry is evicted once `capacity` is reached.
#[derive(Clone)]
pub struct SqlCache {
    inner: Arc<Mutex<LruCache<String, String>>>,
}

pub fn sql_cache_key(request_id: &str, ref_id: &str) -> String {
    format!("{request_id}_{ref_id}")
}

impl SqlCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub async fn insert(&self, request_id: &str, ref_id: &str, sql: String) {
        let key = sql_cache_key(request_id, ref_id);
        self.inner.lock().await.put(key, sql);
    }

    pub async fn get(&self, request_id: &str, ref_id: &str) -> Option<String> {
        let key = sql_cache_key(request_id, ref_id);
        self.inner.lock().await.get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_sql_per_request_and_ref() {
        let cache = SqlCache::new(4);
        cache.insert("req-1", "A", "SELECT 1".into()).await;
        cache.insert("req-1", "B", "SELECT 2".into()).await;
        assert_eq!(cache.get("req-1", "A").await.as_deref(), Some("SELECT 1"));
        assert_eq!(cache.get("req-1", "B").await.as_deref(), Some("SELECT 2"));
        assert!(cache.get("req-2", "A").await.is_none());
    }

    #[tokio::test]
    async fn evicts_least_recently_used_beyond_capacity() {
        let cache = SqlCache::new(2);
        cache.insert("r", "A", "a".into()).await;
        cache.insert("r", "B", "b".into()).await;
        assert_eq!(cache.get("r", "A").await.as_deref(), Some("a"));
        cache.insert("r", "C", "c".into()).await;
        assert_eq!(cache.inner.lock().await.len(), 2);
        assert!(cache.get("r", "B").await.is_none());
        assert_eq!(cache.get("r", "A").await.as_deref(), Some("a"));
        assert_eq!(cache.get("r", "C").await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn zero_capacity_keeps_one_entry() {
        let cache = SqlCache::new(0);
        cache.insert("r", "A", "a".into()).await;
        cache.insert("r", "B", "b".into()).await;
        assert!(cache.get("r", "A").await.is_none());
        assert_eq!(cache.get("r", "B").await.as_deref(), Some("b"));
    }

    #[test]
    fn keys_join_request_and_ref() {
        assert_eq!(sql_cache_key("abc", "A"), "abc_A");
    }
}
