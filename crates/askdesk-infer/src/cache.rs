//! LRU + TTL cache for query embeddings.
//!
//! Chat users repeat the same questions; caching the query vector saves a
//! provider round-trip per repeat. Default: 1000 entries, 1-hour TTL.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use askdesk_core::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::embedder::Embedder;

struct CacheEntry {
    embedding: Vec<f32>,
    inserted_at: Instant,
}

/// Thread-safe LRU cache keyed by the exact query text.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Least recently used at the front.
    order: VecDeque<String>,
    max_size: usize,
    ttl: Duration,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

impl QueryCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(max_size),
                order: VecDeque::with_capacity(max_size),
                max_size: max_size.max(1),
                ttl,
            }),
        }
    }

    pub fn default_cache() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }

    /// Cached embedding, or `None` on miss or expiry.
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        let ttl = inner.ttl;
        let (embedding, expired) = match inner.entries.get(query) {
            Some(entry) => (entry.embedding.clone(), entry.inserted_at.elapsed() >= ttl),
            None => return None,
        };

        if expired {
            inner.remove(query);
            return None;
        }
        inner.touch(query);
        Some(embedding)
    }

    pub fn put(&self, query: String, embedding: Vec<f32>) {
        let mut inner = self.inner.lock();
        let entry = CacheEntry {
            embedding,
            inserted_at: Instant::now(),
        };

        if inner.entries.contains_key(&query) {
            inner.entries.insert(query.clone(), entry);
            inner.touch(&query);
            return;
        }

        while inner.entries.len() >= inner.max_size {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.order.push_back(query.clone());
        inner.entries.insert(query, entry);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

/// Wraps an embedder with a [`QueryCache`]. Only successful results are cached.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: QueryCache,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: QueryCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
