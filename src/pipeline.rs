//! The per-event extraction and filtering pipeline.
//!
//! For each certificate the pipeline resolves every hostname, applies the
//! scan mode, drops noise, and asks the frequency tracker whether the label
//! deserves a notification.

use crate::core::{EventKind, IssuanceEvent, Notification, SuffixResolver};
use crate::deduplication::FrequencyTracker;
use crate::noise::NoiseFilter;
use crate::scope::ScanMode;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

pub struct EventPipeline {
    resolver: Arc<dyn SuffixResolver>,
    mode: ScanMode,
    noise: NoiseFilter,
    tracker: FrequencyTracker,
}

impl EventPipeline {
    pub fn new(
        resolver: Arc<dyn SuffixResolver>,
        mode: ScanMode,
        noise: NoiseFilter,
        tracker: FrequencyTracker,
    ) -> Self {
        Self {
            resolver,
            mode,
            noise,
            tracker,
        }
    }

    /// Processes one event and returns its notifications in hostname order.
    ///
    /// Never fails: a hostname that cannot be handled is skipped, and a store
    /// error only loses that single label.
    pub async fn process(&self, event: &IssuanceEvent) -> Vec<Notification> {
        if event.kind == EventKind::Heartbeat {
            metrics::counter!("heartbeats_total").increment(1);
            return Vec::new();
        }

        let mut seen_in_event = HashSet::new();
        let mut notifications = Vec::new();

        for hostname in &event.hostnames {
            metrics::counter!("hostnames_processed_total").increment(1);
            if hostname.trim().is_empty() {
                continue;
            }

            let resolution = self.resolver.resolve(hostname);
            let Some(candidate) = self.mode.candidate(hostname, &resolution) else {
                continue;
            };

            if !self.noise.accept(&candidate.label) {
                trace!(label = %candidate.label, "Label suppressed as noise");
                metrics::counter!("labels_suppressed_total").increment(1);
                continue;
            }

            // A certificate often lists the same subdomain several times.
            if !seen_in_event.insert(candidate.label.clone()) {
                continue;
            }

            match self.tracker.observe(&candidate).await {
                Ok(Some(notification)) => {
                    let kind = if notification.is_new() { "new" } else { "seen" };
                    metrics::counter!("notifications_total", "kind" => kind).increment(1);
                    notifications.push(notification);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(label = %candidate.label, error = %e, "Failed to record label");
                    metrics::counter!("store_errors_total").increment(1);
                }
            }
        }

        notifications
    }

    /// Consumes events in arrival order until the channel closes or shutdown
    /// is signalled, forwarding notifications to the output stage.
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        events_rx: async_channel::Receiver<IssuanceEvent>,
        notifications_tx: async_channel::Sender<Notification>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Pipeline worker started.");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Pipeline worker received shutdown signal.");
                    break;
                }
                event = events_rx.recv() => match event {
                    Ok(event) => event,
                    Err(_) => {
                        info!("Event channel closed, pipeline worker shutting down.");
                        break;
                    }
                }
            };

            for notification in self.process(&event).await {
                debug!(%notification, "Emitting notification");
                if notifications_tx.send(notification).await.is_err() {
                    warn!("Output channel closed, pipeline worker shutting down.");
                    return;
                }
            }
        }
    }
}
