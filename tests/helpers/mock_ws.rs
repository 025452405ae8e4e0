//! Scripted WebSocketConnection for driving the certstream client.
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use substream::network::WebSocketConnection;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::{Error, Message};

/// Builds a certstream `certificate_update` message.
pub fn certificate_message(hostnames: &[&str]) -> String {
    serde_json::json!({
        "message_type": "certificate_update",
        "data": {
            "update_type": "X509LogEntry",
            "leaf_cert": { "all_domains": hostnames }
        }
    })
    .to_string()
}

pub fn heartbeat_message() -> String {
    r#"{"message_type": "heartbeat", "timestamp": 1700000000.0}"#.to_string()
}

/// Replays queued frames. Once the queue is empty it either reports the
/// connection as closed or, when held open, waits for more frames.
#[derive(Clone)]
pub struct ScriptedWebSocket {
    frames: Arc<Mutex<VecDeque<Result<Message, Error>>>>,
    pushed: Arc<Notify>,
    hold_open: bool,
}

impl ScriptedWebSocket {
    /// A connection that closes after the queued frames.
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::new())),
            pushed: Arc::new(Notify::new()),
            hold_open: false,
        }
    }

    /// A connection that stays open until `close` is pushed.
    pub fn held_open() -> Self {
        Self {
            hold_open: true,
            ..Self::new()
        }
    }

    pub fn push_text(&self, text: String) {
        self.push(Ok(Message::Text(text.into())));
    }

    pub fn push_certificate(&self, hostnames: &[&str]) {
        self.push_text(certificate_message(hostnames));
    }

    pub fn push_frame(&self, frame: Message) {
        self.push(Ok(frame));
    }

    pub fn push_error(&self) {
        self.push(Err(Error::ConnectionClosed));
    }

    pub fn close(&self) {
        self.push(Ok(Message::Close(None)));
    }

    fn push(&self, frame: Result<Message, Error>) {
        self.frames.lock().unwrap().push_back(frame);
        self.pushed.notify_one();
    }
}

#[async_trait]
impl WebSocketConnection for ScriptedWebSocket {
    async fn read_message(&mut self) -> Option<Result<Message, Error>> {
        loop {
            if let Some(frame) = self.frames.lock().unwrap().pop_front() {
                return Some(frame);
            }
            if !self.hold_open {
                return None;
            }
            self.pushed.notified().await;
        }
    }
}
