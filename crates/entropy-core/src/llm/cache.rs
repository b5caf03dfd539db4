//! Prompt-prefix cache.
//!
//! An `RwLock<HashMap<String, CacheEntry>>` with an absolute TTL,
//! tracking *whether* a given system prompt prefix is still within the
//! provider's cache window rather than storing arbitrary values.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Provider-side prompt cache TTL (vendor-documented figure; not
/// itself part of this spec, but needed to decide whether a repeat
/// call on the same prefix is still discounted).
const PROVIDER_CACHE_TTL: Duration = Duration::from_secs(300);

struct Entry {
    expires_at: Instant,
}

/// Tracks which cacheable system-prompt prefixes are "warm" on the
/// provider side. `LLMClient::call` uses this to decide whether to
/// apply the cache discount to a call's cost.
pub struct PromptCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl PromptCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(system_prompt: &str) -> String {
        blake3::hash(system_prompt.as_bytes()).to_hex().to_string()
    }

    /// Whether `system_prompt` is currently warm (a prior call marked
    /// it cacheable and the TTL has not elapsed).
    pub fn is_warm(&self, system_prompt: &str) -> bool {
        let key = Self::key(system_prompt);
        self.entries
            .read()
            .ok()
            .and_then(|m| m.get(&key).map(|e| Instant::now() < e.expires_at))
            .unwrap_or(false)
    }

    /// Mark `system_prompt` cacheable, resetting its TTL.
    pub fn mark_cacheable(&self, system_prompt: &str) {
        let key = Self::key(system_prompt);
        if let Ok(mut m) = self.entries.write() {
            m.insert(
                key,
                Entry {
                    expires_at: Instant::now() + PROVIDER_CACHE_TTL,
                },
            );
        }
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_prefix_is_not_warm() {
        let cache = PromptCache::new();
        assert!(!cache.is_warm("you are a helpful assistant"));
    }

    #[test]
    fn marking_cacheable_makes_it_warm() {
        let cache = PromptCache::new();
        cache.mark_cacheable("you are a helpful assistant");
        assert!(cache.is_warm("you are a helpful assistant"));
    }

    #[test]
    fn distinct_prefixes_are_independent() {
        let cache = PromptCache::new();
        cache.mark_cacheable("prompt a");
        assert!(!cache.is_warm("prompt b"));
    }
}
