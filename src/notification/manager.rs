//! The notification manager is an actor that forwards published notifications
//! to a `Notifier`, one message per notification.

use crate::core::{Notification, Notifier};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// The `NotificationManager` actor.
pub struct NotificationManager {
    notification_rx: broadcast::Receiver<Notification>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationManager {
    pub fn new(
        notification_rx: broadcast::Receiver<Notification>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            notification_rx,
            notifier,
        }
    }

    /// Runs until the channel closes or shutdown is signalled. Deliveries
    /// still queued at shutdown are dropped.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("NotificationManager started.");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("NotificationManager received shutdown signal.");
                    break;
                }
                result = self.notification_rx.recv() => match result {
                    Ok(notification) => self.deliver(&notification).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("NotificationManager lagged, dropping {} notifications.", n);
                        metrics::counter!("notifications_dropped_total").increment(n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Notification channel closed. Shutting down NotificationManager.");
                        break;
                    }
                }
            }
        }
    }

    async fn deliver(&self, notification: &Notification) {
        let text = notification.to_string();
        match self.notifier.deliver(&text).await {
            Ok(()) => {
                debug!(label = %notification.label, "Notification delivered");
                metrics::counter!("notifications_delivered_total").increment(1);
            }
            Err(e) => {
                error!(label = %notification.label, error = %e, "Failed to deliver notification");
                metrics::counter!("notification_failures_total").increment(1);
            }
        }
    }
}
