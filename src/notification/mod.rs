//! Outbound chat notifications.
//!
//! The output task publishes every notification on a broadcast channel. The
//! `NotificationManager` subscribes to it and hands each one to a `Notifier`,
//! so slow or failing deliveries never hold up the pipeline.
pub mod manager;
pub mod telegram;
