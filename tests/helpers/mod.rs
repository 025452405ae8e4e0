#![allow(dead_code)]
//! Shared fixtures for the integration tests.

pub mod mock_notifier;
pub mod mock_output;
pub mod mock_ws;

use std::time::Duration;
use substream::config::Config;

/// How long a test waits for something that should happen promptly.
pub const WAIT: Duration = Duration::from_secs(5);

/// Default configuration pointed at a URL that is never dialed.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.network.certstream_url = "ws://127.0.0.1:1/unused".to_string();
    config.network.queue_capacity = 64;
    config
}

/// Polls `condition` until it holds or `WAIT` elapses.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, poll)
        .await
        .expect("Timed out waiting for condition");
}
