//! Alignment bundle cache keyed by `(language, align_model)`.
//!
//! Entries are never evicted. A failed load is not cached, so the next job
//! with the same key tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::engine::InferenceError;

type AlignKey = (String, Option<String>);

pub struct AlignmentCache<B> {
    entries: HashMap<AlignKey, Arc<B>>,
}

impl<B> AlignmentCache<B> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the cached bundle for the key, running `load` on a miss.
    pub async fn get_or_load<F, Fut>(
        &mut self,
        language: &str,
        align_model: Option<&str>,
        load: F,
    ) -> Result<Arc<B>, InferenceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<B, InferenceError>>,
    {
        let key = (language.to_string(), align_model.map(str::to_string));
        if let Some(bundle) = self.entries.get(&key) {
            return Ok(Arc::clone(bundle));
        }

        tracing::info!(language, align_model = ?align_model, "Loading alignment bundle");
        let bundle = Arc::new(load().await?);
        self.entries.insert(key, Arc::clone(&bundle));
        Ok(bundle)
    }

    pub fn contains(&self, language: &str, align_model: Option<&str>) -> bool {
        self.entries
            .contains_key(&(language.to_string(), align_model.map(str::to_string)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B> Default for AlignmentCache<B> {
    fn default() -> Self {
        Self::new()
    }
}
