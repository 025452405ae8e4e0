//! Core domain types and service traits for substream
//!
//! This module defines the data flowing through the pipeline and the trait
//! contracts for the collaborators the pipeline is built from.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of message received from the certstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Keepalive message; carries no payload.
    Heartbeat,
    /// A newly logged certificate.
    CertificateUpdate,
}

/// One certificate transparency log entry as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceEvent {
    pub kind: EventKind,
    /// Subject Alternative Names in the order the certificate lists them.
    /// May contain duplicates and wildcard entries.
    pub hostnames: Vec<String>,
}

impl IssuanceEvent {
    pub fn heartbeat() -> Self {
        Self {
            kind: EventKind::Heartbeat,
            hostnames: Vec::new(),
        }
    }

    pub fn certificate<I, S>(hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: EventKind::CertificateUpdate,
            hostnames: hostnames.into_iter().map(Into::into).collect(),
        }
    }
}

/// A hostname split at its registrable domain.
///
/// `a.b.example.co.uk` resolves to `registrable_domain = "example.co.uk"`,
/// `suffix = "co.uk"` and `label = "a.b"`. Any part that could not be
/// determined is left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub registrable_domain: String,
    pub suffix: String,
    pub label: String,
}

/// A candidate that survived scoping, ready for filtering and deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservedLabel {
    /// The text that is reported: a subdomain label, or the full hostname in
    /// targeted mode.
    pub label: String,
    /// The registrable domain the label belongs to.
    pub domain: String,
}

/// Why a notification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// First sighting of the label.
    New,
    /// Periodic re-alert for a label seen `count` times in total.
    Seen { count: u64 },
}

/// An accepted label handed to the sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub label: String,
    pub domain: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(observed: &ObservedLabel) -> Self {
        Self {
            label: observed.label.clone(),
            domain: observed.domain.clone(),
            kind: NotificationKind::New,
        }
    }

    pub fn seen(observed: &ObservedLabel, count: u64) -> Self {
        Self {
            label: observed.label.clone(),
            domain: observed.domain.clone(),
            kind: NotificationKind::Seen { count },
        }
    }

    pub fn is_new(&self) -> bool {
        self.kind == NotificationKind::New
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NotificationKind::New => write!(f, "[+] {}", self.label),
            NotificationKind::Seen { count } => {
                write!(f, "[#] {} (seen {} times)", self.label, count)
            }
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Splits hostnames into registrable domain and subdomain label.
pub trait SuffixResolver: Send + Sync {
    /// Resolves a hostname. Must not fail: malformed input yields empty parts.
    fn resolve(&self, hostname: &str) -> Resolution;
}

/// Durable or in-memory occurrence counters keyed by label.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Records one more sighting of `label` and returns the total count,
    /// including this one. A return value of `1` means first sight.
    ///
    /// The lookup-increment must be atomic per label.
    async fn record(&self, label: &str) -> Result<u64>;
}

/// Writes notifications to a destination.
#[async_trait]
pub trait Output: Send + Sync {
    /// A unique, descriptive name for the output, used in logs and metrics.
    fn name(&self) -> &str;

    /// Writes a single notification.
    async fn send(&self, notification: &Notification) -> Result<()>;

    /// Flushes any buffered data. Called once at shutdown.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Best-effort outbound delivery of a text message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<()>;
}
