//! The main application logic, decoupled from the entry point.

use crate::{
    config::{Config, StoreKind},
    core::{IssuanceEvent, LabelStore, Notification, Notifier, Output, SuffixResolver},
    deduplication::{FrequencyTracker, MemoryLabelStore},
    network::{CertStreamClient, WebSocketConnection},
    noise::NoiseFilter,
    notification::{manager::NotificationManager, telegram::TelegramClient},
    outputs::{FileOutput, OutputManager, StdoutOutput},
    pipeline::EventPipeline,
    scope::ScanMode,
    store::SqliteLabelStore,
    suffix::PslResolver,
    task_manager::TaskManager,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument};

/// Capacity of the broadcast channel feeding the notification manager.
const NOTIFICATION_BUFFER: usize = 1024;

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Waits for the shutdown signal, then for every task to finish.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.shutdown_rx();
        if !*shutdown_rx.borrow_and_update() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        let panicked = self.task_manager.join_all().await;
        if !panicked.is_empty() {
            anyhow::bail!("tasks panicked during shutdown: {:?}", panicked);
        }
        Ok(())
    }
}

/// Builder for the main application.
///
/// Every external collaborator can be overridden, which is how the
/// integration tests drive the full pipeline without a network.
pub struct AppBuilder {
    config: Config,
    events_rx_for_test: Option<async_channel::Receiver<IssuanceEvent>>,
    websocket_override: Option<Box<dyn WebSocketConnection>>,
    output_override: Option<Vec<Arc<dyn Output>>>,
    store_override: Option<Arc<dyn LabelStore>>,
    notifier_override: Option<Arc<dyn Notifier>>,
    resolver_override: Option<Arc<dyn SuffixResolver>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            events_rx_for_test: None,
            websocket_override: None,
            output_override: None,
            store_override: None,
            notifier_override: None,
            resolver_override: None,
        }
    }

    /// Feeds the pipeline from this channel instead of the certstream client.
    pub fn events_rx_for_test(mut self, rx: async_channel::Receiver<IssuanceEvent>) -> Self {
        self.events_rx_for_test = Some(rx);
        self
    }

    /// Reads from this connection instead of dialing the certstream URL.
    pub fn websocket_override(mut self, ws: Box<dyn WebSocketConnection>) -> Self {
        self.websocket_override = Some(ws);
        self
    }

    pub fn output_override(mut self, outputs: Vec<Arc<dyn Output>>) -> Self {
        self.output_override = Some(outputs);
        self
    }

    pub fn store_override(mut self, store: Arc<dyn LabelStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    /// Enables chat notifications through this notifier, regardless of
    /// the Telegram configuration.
    pub fn notifier_override(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier_override = Some(notifier);
        self
    }

    pub fn resolver_override(mut self, resolver: Arc<dyn SuffixResolver>) -> Self {
        self.resolver_override = Some(resolver);
        self
    }

    /// Builds and starts all components, returning a runnable `App`.
    ///
    /// Any error here is a startup error: nothing has been read from the
    /// feed yet.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Pipeline Components
        // =========================================================================
        let mode = ScanMode::from_config(&config.filter)?;
        if let ScanMode::Targeted(filter) = &mode {
            info!("Targeted mode: watching {} domains", filter.len());
        }

        let noise = NoiseFilter::from_config(&config.noise)?;
        let (literals, patterns) = noise.rule_counts();
        debug!(literals, patterns, "Compiled noise filter");

        let (store, realert_every): (Arc<dyn LabelStore>, Option<u64>) = {
            let realert_every = match config.deduplication.store {
                StoreKind::Memory => None,
                StoreKind::Sqlite => Some(config.deduplication.realert_threshold),
            };
            let store = match self.store_override {
                Some(store) => store,
                None => match config.deduplication.store {
                    StoreKind::Memory => Arc::new(MemoryLabelStore::new()) as Arc<dyn LabelStore>,
                    StoreKind::Sqlite => {
                        Arc::new(SqliteLabelStore::open(&config.deduplication.db_path).await?)
                            as Arc<dyn LabelStore>
                    }
                },
            };
            (store, realert_every)
        };
        debug!(?realert_every, "Initializing frequency tracker");
        let tracker = FrequencyTracker::new(store, realert_every);

        let resolver = self
            .resolver_override
            .unwrap_or_else(|| Arc::new(PslResolver::new()));
        let pipeline = Arc::new(EventPipeline::new(resolver, mode, noise, tracker));

        // =========================================================================
        // 2. Outputs
        // =========================================================================
        let outputs = match self.output_override {
            Some(outputs) => outputs,
            None => {
                let mut outputs: Vec<Arc<dyn Output>> =
                    vec![Arc::new(StdoutOutput::new(config.output.format))];
                if let Some(path) = &config.output.file {
                    outputs.push(Arc::new(FileOutput::open(path).await?));
                }
                outputs
            }
        };
        let output_manager = OutputManager::new(outputs);
        info!(outputs = ?output_manager.names(), "Outputs configured");

        let notifier: Option<Arc<dyn Notifier>> = match self.notifier_override {
            Some(notifier) => Some(notifier),
            None if config.output.telegram.enabled => {
                Some(Arc::new(TelegramClient::from_config(&config.output.telegram)?))
            }
            None => None,
        };

        // =========================================================================
        // 3. Event Source
        // =========================================================================
        let events_rx = match self.events_rx_for_test {
            Some(rx) => rx,
            None => {
                let (tx, rx) = async_channel::bounded(config.network.queue_capacity);
                let client = CertStreamClient::new(config.network.certstream_url.clone(), tx);
                let websocket_override = self.websocket_override;
                let mut shutdown_rx = task_manager.shutdown_rx();

                task_manager.spawn("CertStreamClient", async move {
                    let result = match websocket_override {
                        Some(ws) => tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => Ok(()),
                            res = client.run_with_connection(ws) => res,
                        },
                        None => client.run(shutdown_rx).await,
                    };
                    if let Err(e) = result {
                        error!("Certstream client failed: {}", e);
                    }
                });
                rx
            }
        };

        // =========================================================================
        // 4. Pipeline Worker, Output Task and Notifications
        // =========================================================================
        let (notifications_tx, notifications_rx) =
            async_channel::bounded(config.network.queue_capacity);

        task_manager.spawn(
            "PipelineWorker",
            pipeline.run(events_rx, notifications_tx, task_manager.shutdown_rx()),
        );

        let notification_tx = notifier.map(|notifier| {
            let (tx, rx) = broadcast::channel(NOTIFICATION_BUFFER);
            let manager = NotificationManager::new(rx, notifier);
            task_manager.spawn("NotificationManager", manager.run(task_manager.shutdown_rx()));
            info!("Chat notifications enabled.");
            tx
        });

        task_manager.spawn(
            "OutputTask",
            output_task_logic(notifications_rx, output_manager, notification_tx),
        );

        info!("substream initialized. Watching for new subdomains...");
        Ok(App { task_manager })
    }
}

/// Writes notifications to the outputs and publishes them for chat delivery.
///
/// Runs until the pipeline worker drops its sender, so everything already
/// produced is written before the outputs are flushed.
async fn output_task_logic(
    notifications_rx: async_channel::Receiver<Notification>,
    output_manager: OutputManager,
    notification_tx: Option<broadcast::Sender<Notification>>,
) {
    while let Ok(notification) = notifications_rx.recv().await {
        output_manager.send(&notification).await;

        if let Some(tx) = &notification_tx {
            // An error only means the notification manager has already stopped.
            if tx.send(notification).is_err() {
                debug!("No notification subscriber, dropping chat delivery");
            }
        }
    }

    output_manager.flush().await;
    info!("Output task finished.");
}
