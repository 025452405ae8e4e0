//! Tracks the application's background tasks so shutdown can wait for them.
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type NamedHandle = (&'static str, JoinHandle<()>);

/// Spawns named tasks and awaits them all on shutdown. Cloning shares the
/// same task list.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<NamedHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    /// A fresh receiver for the shared shutdown signal.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn task_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Waits for every spawned task to finish. Returns the names of tasks
    /// that panicked.
    pub async fn join_all(self) -> Vec<&'static str> {
        let handles: Vec<NamedHandle> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        info!("Waiting for {} tasks to complete...", handles.len());

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let panicked: Vec<&'static str> = names
            .into_iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(()) => {
                    debug!(task_name = name, "Task finished.");
                    None
                }
                Err(e) => {
                    error!(task_name = name, error = %e, "Task panicked.");
                    Some(name)
                }
            })
            .collect();

        if panicked.is_empty() {
            info!("All tasks finished.");
        }
        panicked
    }
}
