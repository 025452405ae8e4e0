//! Output sinks and the manager that fans notifications out to them.

use crate::config::OutputFormat;
use crate::core::{Notification, Output};
use crate::formatting::{formatter_for, TextFormatter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, trace};

/// Prints every notification to stdout.
pub struct StdoutOutput {
    formatter: Box<dyn TextFormatter>,
}

impl StdoutOutput {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            formatter: formatter_for(format),
        }
    }
}

#[async_trait]
impl Output for StdoutOutput {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        println!("{}", self.formatter.format(notification));
        Ok(())
    }
}

/// Appends newly found labels to a file, one per line.
///
/// Re-alerts are not written: the file is the list of distinct findings.
pub struct FileOutput {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileOutput {
    /// Opens `path` for appending, creating it if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Output for FileOutput {
    fn name(&self) -> &str {
        "file"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        if !notification.is_new() {
            return Ok(());
        }
        let line = format!("{}\n", notification.label);
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        // tokio completes file writes in the background until flushed.
        file.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Dispatches each notification to every configured output.
///
/// A failing output is logged and counted; it never prevents delivery to the
/// remaining outputs or the processing of later notifications.
pub struct OutputManager {
    outputs: Vec<Arc<dyn Output>>,
}

impl OutputManager {
    pub fn new(outputs: Vec<Arc<dyn Output>>) -> Self {
        Self { outputs }
    }

    /// Sends to all outputs in order. Returns the number of failures.
    pub async fn send(&self, notification: &Notification) -> usize {
        let mut failures = 0;
        for output in &self.outputs {
            match output.send(notification).await {
                Ok(()) => {
                    trace!(output = output.name(), label = %notification.label, "Notification written");
                    metrics::counter!("notifications_written_total", "output" => output.name().to_string())
                        .increment(1);
                }
                Err(e) => {
                    failures += 1;
                    error!(output = output.name(), error = %e, "Failed to write notification");
                    metrics::counter!("output_failures_total", "output" => output.name().to_string())
                        .increment(1);
                }
            }
        }
        failures
    }

    pub async fn flush(&self) {
        for output in &self.outputs {
            if let Err(e) = output.flush().await {
                error!(output = output.name(), error = %e, "Failed to flush output");
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name()).collect()
    }
}
