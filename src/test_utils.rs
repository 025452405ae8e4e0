//! Test doubles shared by unit and integration tests.

use crate::core::LabelStore;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory `LabelStore` that remembers every call it receives.
///
/// Can be seeded with prior counts to simulate a store that survived a
/// restart, and told to fail for specific labels.
#[derive(Debug, Default)]
pub struct RecordingStore {
    counts: Mutex<HashMap<String, u64>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates counts, as if the labels had been seen before.
    pub fn with_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let store = Self::new();
        store
            .counts
            .lock()
            .unwrap()
            .extend(counts.into_iter().map(|(label, count)| (label.into(), count)));
        store
    }

    /// Makes every future `record` for `label` return an error.
    pub fn fail_on(&self, label: &str) {
        self.failing.lock().unwrap().push(label.to_string());
    }

    /// Labels passed to `record`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> u64 {
        self.counts.lock().unwrap().get(label).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LabelStore for RecordingStore {
    async fn record(&self, label: &str) -> Result<u64> {
        self.calls.lock().unwrap().push(label.to_string());
        if self.failing.lock().unwrap().iter().any(|l| l == label) {
            anyhow::bail!("simulated store failure for {}", label);
        }
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(label.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
