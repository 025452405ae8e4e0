// Deduplication and re-alert policy for observed labels.

use crate::core::{LabelStore, Notification, ObservedLabel};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;

/// A process-lifetime label counter.
///
/// Nothing is evicted: every label seen since startup is remembered.
pub struct MemoryLabelStore {
    cache: Cache<String, u64>,
}

impl MemoryLabelStore {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }
}

impl Default for MemoryLabelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LabelStore for MemoryLabelStore {
    async fn record(&self, label: &str) -> Result<u64> {
        // The upsert closure runs under moka's per-key lock.
        let entry = self
            .cache
            .entry(label.to_string())
            .and_upsert_with(|existing| {
                let count = existing.map_or(1, |e| e.into_value() + 1);
                std::future::ready(count)
            })
            .await;

        metrics::gauge!("label_store_entries").set(self.cache.entry_count() as f64);

        Ok(entry.into_value())
    }
}

/// Turns label occurrence counts into notifications.
#[derive(Clone)]
pub struct FrequencyTracker {
    store: Arc<dyn LabelStore>,
    realert_every: Option<u64>,
}

impl FrequencyTracker {
    /// Creates a tracker. With `realert_every = Some(n)`, every n-th sighting
    /// of a label produces a "seen" notification; `None` (or zero) reports
    /// each label exactly once.
    pub fn new(store: Arc<dyn LabelStore>, realert_every: Option<u64>) -> Self {
        Self {
            store,
            realert_every: realert_every.filter(|n| *n > 0),
        }
    }

    /// Records a sighting and returns the notification it warrants, if any.
    ///
    /// The store is updated before anything is delivered, so a failed
    /// delivery never causes a label to be reported as new again.
    pub async fn observe(&self, observed: &ObservedLabel) -> Result<Option<Notification>> {
        let count = self.store.record(&observed.label).await?;

        if count == 1 {
            return Ok(Some(Notification::new(observed)));
        }
        match self.realert_every {
            Some(threshold) if count % threshold == 0 => {
                Ok(Some(Notification::seen(observed, count)))
            }
            _ => Ok(None),
        }
    }

    pub fn realert_every(&self) -> Option<u64> {
        self.realert_every
    }
}
