// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Caching layer for inference responses

use crate::llm_client::{InferenceEngine, LLMError, Prompt};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Engine wrapper that answers repeated prompts from a TTL cache
///
/// Only cache misses are forwarded, in a single batched call, so a batch
/// that is partly cached still costs one inference round.
pub struct CachedInference {
    inner: Arc<dyn InferenceEngine>,
    cache: Cache<CacheKey, String>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CachedInference {
    pub fn new(inner: Arc<dyn InferenceEngine>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Clear entire cache
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

#[async_trait]
impl InferenceEngine for CachedInference {
    async fn infer(&self, prompts: Vec<Prompt>) -> Result<Vec<String>, LLMError> {
        let keys: Vec<CacheKey> = prompts
            .iter()
            .map(|p| CacheKey::new(self.inner.engine_name(), p))
            .collect();

        let mut outputs: Vec<Option<String>> = Vec::with_capacity(prompts.len());
        let mut missing = Vec::new();
        for (idx, key) in keys.iter().enumerate() {
            match self.cache.get(key).await {
                Some(text) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    outputs.push(Some(text));
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    outputs.push(None);
                    missing.push(idx);
                }
            }
        }

        if !missing.is_empty() {
            let batch: Vec<Prompt> = missing.iter().map(|&idx| prompts[idx].clone()).collect();
            let generated = self.inner.infer(batch).await?;
            if generated.len() != missing.len() {
                return Err(LLMError::InvalidResponse(format!(
                    "expected {} outputs, got {}",
                    missing.len(),
                    generated.len()
                )));
            }
            for (idx, text) in missing.into_iter().zip(generated) {
                self.cache.insert(keys[idx].clone(), text.clone()).await;
                outputs[idx] = Some(text);
            }
        }

        Ok(outputs.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn engine_name(&self) -> &str {
        self.inner.engine_name()
    }
}

/// Cache key based on engine name and full prompt content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    prompt_hash: u64,
}

impl CacheKey {
    pub fn new(engine_name: &str, prompt: &Prompt) -> Self {
        let mut hasher = DefaultHasher::new();
        engine_name.hash(&mut hasher);
        prompt.messages.hash(&mut hasher);
        // Map<String, Value> has no Hash impl; its canonical JSON does
        serde_json::Value::Object(prompt.constraints.clone())
            .to_string()
            .hash(&mut hasher);

        Self {
            prompt_hash: hasher.finish(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct EchoEngine {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl InferenceEngine for EchoEngine {
        async fn infer(&self, prompts: Vec<Prompt>) -> Result<Vec<String>, LLMError> {
            self.batches.lock().push(prompts.len());
            Ok(prompts.iter().map(|p| p.user_text().to_uppercase()).collect())
        }

        fn engine_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_only_misses_are_forwarded() {
        let engine = Arc::new(EchoEngine {
            batches: Mutex::new(Vec::new()),
        });
        let cached = CachedInference::new(engine.clone(), Duration::from_secs(3600));

        let first = cached
            .infer(vec![Prompt::text("a"), Prompt::text("b")])
            .await
            .unwrap();
        assert_eq!(first, vec!["A", "B"]);

        let second = cached
            .infer(vec![Prompt::text("b"), Prompt::text("c")])
            .await
            .unwrap();
        assert_eq!(second, vec!["B", "C"]);

        assert_eq!(*engine.batches.lock(), vec![2, 1]);
        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
    }

    #[test]
    fn test_cache_key_depends_on_constraints() {
        let plain = CacheKey::new("m", &Prompt::text("x"));
        let constrained = CacheKey::new(
            "m",
            &Prompt::text("x").with_constraint("temperature", serde_json::json!(0.7)),
        );
        assert_ne!(plain, constrained);
        assert_eq!(plain, CacheKey::new("m", &Prompt::text("x")));
    }
}
