use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use substream::core::{Notification, Output};

/// A mock Output that keeps every notification it receives.
#[derive(Clone, Debug, Default)]
pub struct CollectingOutput {
    pub received: Arc<Mutex<Vec<Notification>>>,
    pub flushed: Arc<AtomicBool>,
}

impl CollectingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// The received notifications rendered as console lines.
    pub fn lines(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Output for CollectingOutput {
    fn name(&self) -> &str {
        "collecting_mock"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.flushed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A mock Output whose writes fail while `fail` is set.
#[derive(Clone, Debug, Default)]
pub struct FailableOutput {
    pub received: Arc<Mutex<Vec<Notification>>>,
    fail: Arc<AtomicBool>,
}

impl FailableOutput {
    pub fn failing() -> Self {
        let output = Self::default();
        output.set_failing(true);
        output
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Output for FailableOutput {
    fn name(&self) -> &str {
        "failable_mock"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated output failure");
        }
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
