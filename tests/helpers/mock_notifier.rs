//! A mock chat notifier for testing notification delivery.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use substream::core::Notifier;

#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, text: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
