//! Network client for the certstream WebSocket feed
//!
//! This module handles connecting to the certstream websocket, parsing
//! messages into `IssuanceEvent`s, and reconnecting with backoff.

use crate::core::IssuanceEvent;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message};

const INITIAL_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 60_000;

/// Parses a raw certstream JSON message into an event.
///
/// # Returns
/// * `Ok(IssuanceEvent)` for heartbeat and certificate update messages
/// * `Err` if the JSON is malformed or of an unknown message type
pub fn parse_message(text: &str) -> Result<IssuanceEvent> {
    #[derive(Deserialize)]
    #[serde(tag = "message_type", rename_all = "snake_case")]
    enum CertStreamMessage {
        Heartbeat {},
        CertificateUpdate { data: MessageData },
    }

    #[derive(Deserialize)]
    struct MessageData {
        leaf_cert: LeafCert,
    }

    #[derive(Deserialize)]
    struct LeafCert {
        #[serde(default)]
        all_domains: Vec<String>,
    }

    let message: CertStreamMessage = serde_json::from_str(text)?;
    Ok(match message {
        CertStreamMessage::Heartbeat {} => IssuanceEvent::heartbeat(),
        CertStreamMessage::CertificateUpdate { data } => {
            IssuanceEvent::certificate(data.leaf_cert.all_domains)
        }
    })
}

/// Trait for WebSocket connections to enable testing with fake implementations
#[async_trait]
pub trait WebSocketConnection: Send + Sync {
    /// Reads the next message from the WebSocket connection
    ///
    /// # Returns
    /// * `Some(Ok(Message))` if a message was successfully received
    /// * `Some(Err(error))` if there was an error reading the message
    /// * `None` if the connection has been closed
    async fn read_message(&mut self) -> Option<Result<Message, tungstenite::Error>>;
}

/// What the read loop should do after handling one frame.
enum Flow {
    Continue,
    Closed,
}

/// Certstream WebSocket client that forwards every parsed event to the
/// pipeline, in arrival order.
pub struct CertStreamClient {
    url: String,
    output_tx: async_channel::Sender<IssuanceEvent>,
}

impl CertStreamClient {
    /// Creates a new certstream client
    ///
    /// # Arguments
    /// * `url` - The WebSocket URL to connect to
    /// * `output_tx` - Channel sender feeding the event pipeline
    pub fn new(url: String, output_tx: async_channel::Sender<IssuanceEvent>) -> Self {
        Self { url, output_tx }
    }

    /// Processes messages from the provided connection until it closes.
    /// Does not reconnect.
    pub async fn run_with_connection(
        &self,
        mut connection: Box<dyn WebSocketConnection>,
    ) -> Result<()> {
        log::info!("Starting certstream client message processing");

        while let Some(frame) = connection.read_message().await {
            let frame = frame.map_err(|e| anyhow!("WebSocket error: {}", e))?;
            if let Flow::Closed = self.handle_frame(frame).await? {
                break;
            }
        }

        log::info!("WebSocket connection closed");
        Ok(())
    }

    /// Runs the client with automatic reconnection until shutdown is signalled.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            log::info!("Attempting to connect to {}", self.url);

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::info!("Certstream client received shutdown signal.");
                    return Ok(());
                }
                result = self.connect_and_run() => match result {
                    Ok(()) => {
                        log::info!("Connection closed normally");
                        backoff_ms = INITIAL_BACKOFF_MS;
                    }
                    Err(e) => {
                        if self.output_tx.is_closed() {
                            return Err(e);
                        }
                        log::error!("Connection failed: {}", e);
                    }
                }
            }

            log::info!("Reconnecting in {} ms", backoff_ms);
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
    }

    async fn connect_and_run(&self) -> Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| anyhow!("Failed to connect to {}: {}", self.url, e))?;

        log::info!("Connected to {}", self.url);

        let (_, mut read) = ws_stream.split();

        while let Some(frame) = read.next().await {
            let frame = frame.map_err(|e| anyhow!("WebSocket error: {}", e))?;
            if let Flow::Closed = self.handle_frame(frame).await? {
                break;
            }
        }

        Ok(())
    }

    /// Parses one frame and forwards the event. Only a closed pipeline
    /// channel is an error; malformed messages are logged and skipped.
    async fn handle_frame(&self, frame: Message) -> Result<Flow> {
        match frame {
            Message::Text(text) => match parse_message(&text) {
                Ok(event) => {
                    metrics::counter!("events_received_total").increment(1);
                    log::debug!(
                        "Parsed {:?} event with {} hostnames",
                        event.kind,
                        event.hostnames.len()
                    );
                    if let Err(e) = self.output_tx.send(event).await {
                        log::error!("Failed to send event to pipeline: {}", e);
                        return Err(anyhow!("Pipeline channel closed: {}", e));
                    }
                }
                Err(e) => {
                    metrics::counter!("events_malformed_total").increment(1);
                    log::warn!("Failed to parse certstream message: {}", e);
                }
            },
            Message::Close(_) => {
                log::info!("Received close message from server");
                return Ok(Flow::Closed);
            }
            Message::Binary(_) | Message::Frame(_) => {
                log::debug!("Received non-text frame, ignoring");
            }
            Message::Ping(_) | Message::Pong(_) => {
                log::trace!("Received ping/pong");
            }
        }
        Ok(Flow::Continue)
    }
}
