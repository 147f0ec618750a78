use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::asset::AudioAsset;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub voice_id: String,
    pub text_hash: String,
}

impl CacheKey {
    pub fn new(voice_id: impl Into<String>, text_hash: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            text_hash: text_hash.into(),
        }
    }
}

/// Memoizes generated audio per (voice, script prefix).
///
/// Entries only come from successful generations and leave only through
/// explicit invalidation; nothing expires on its own.
#[derive(Default)]
pub struct GenerationCache {
    entries: Mutex<HashMap<CacheKey, Arc<AudioAsset>>>,
}

impl GenerationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<AudioAsset>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<AudioAsset>> {
        self.entries().get(key).cloned()
    }

    /// Return the cached asset for `key`, or run `generate` and cache its success.
    ///
    /// The lock is not held while `generate` runs. Errors are returned as-is and
    /// leave no entry behind, so calling again retries.
    pub async fn get_or_generate<F, Fut, E>(
        &self,
        key: &CacheKey,
        generate: F,
    ) -> Result<Arc<AudioAsset>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AudioAsset, E>>,
    {
        if let Some(asset) = self.get(key) {
            debug!("Cache hit for voice '{}'", key.voice_id);
            return Ok(asset);
        }

        debug!("Cache miss for voice '{}', generating", key.voice_id);
        let asset = Arc::new(generate().await?);
        self.entries().insert(key.clone(), asset.clone());
        Ok(asset)
    }

    /// Drop every entry generated with `voice_id`.
    pub fn invalidate(&self, voice_id: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| key.voice_id != voice_id);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Invalidated {} cached asset(s) for voice '{}'", removed, voice_id);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
