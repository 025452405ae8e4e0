// src/formatting.rs

use crate::config::OutputFormat;
use crate::core::Notification;
use chrono::Utc;
use serde_json::json;

/// A trait for rendering a notification as a single line of text.
pub trait TextFormatter: Send + Sync {
    fn format(&self, notification: &Notification) -> String;
}

/// `[+] label` / `[#] label (seen N times)`.
pub struct PlainTextFormatter;

impl TextFormatter for PlainTextFormatter {
    fn format(&self, notification: &Notification) -> String {
        notification.to_string()
    }
}

/// One JSON object per line, stamped with the time of output.
pub struct JsonFormatter;

impl JsonFormatter {
    fn format_at(&self, notification: &Notification, timestamp: &str) -> String {
        let mut value = json!(notification);
        value["timestamp"] = json!(timestamp);
        value.to_string()
    }
}

impl TextFormatter for JsonFormatter {
    fn format(&self, notification: &Notification) -> String {
        self.format_at(notification, &Utc::now().to_rfc3339())
    }
}

pub fn formatter_for(format: OutputFormat) -> Box<dyn TextFormatter> {
    match format {
        OutputFormat::Plain => Box::new(PlainTextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}
