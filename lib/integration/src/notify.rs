//! User-facing notifications.
//!
//! Components report outcomes the user should see (a connection succeeded,
//! a fetch fell back to sample data) as [`Notice`]s. Delivery is
//! fire-and-forget; a notifier never blocks or fails the caller.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notice {
    #[must_use]
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// Sink for notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Logs notices instead of showing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => {
                tracing::info!(title = %notice.title, "{}", notice.description);
            }
            NoticeLevel::Error => {
                tracing::warn!(title = %notice.title, "{}", notice.description);
            }
        }
    }
}

/// Forwards notices over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver that observes its notices.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // Receiver gone means nobody is watching; dropping is fine.
        let _ = self.tx.send(notice);
    }
}

/// Collects notices in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Copies of the recorded notices.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_drains() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notice::info("Success", "Fetched 2 items from notion"));
        notifier.notify(Notice::error("Error", "Failed to fetch items from hubspot"));

        assert_eq!(notifier.snapshot().len(), 2);
        let drained = notifier.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained[1].is_error());
        assert!(notifier.snapshot().is_empty());
    }

    #[tokio::test]
    async fn channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notice::info("Disconnected", "Successfully disconnected from Notion."));

        let notice = rx.recv().await.expect("notice");
        assert_eq!(notice.title, "Disconnected");
    }

    #[test]
    fn channel_notifier_tolerates_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notice::error("Error", "ignored"));
    }
}
