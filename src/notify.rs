use std::fmt;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// UI 向けの通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Error(String),
}

impl Notification {
    pub fn message(&self) -> &str {
        match self {
            Notification::Success(m) | Notification::Error(m) => m,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notification::Error(_))
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Success(m) => write!(f, "OK: {m}"),
            Notification::Error(m) => write!(f, "Error: {m}"),
        }
    }
}

/// 通知の送信側。受信側が閉じていても送信は失敗しない。
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn new(tx: UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.send(Notification::Success(message.into()));
    }

    /// エラーは warn ログにも出す
    pub fn error(&self, error: &dyn std::error::Error) {
        tracing::warn!("{error}");
        self.send(Notification::Error(error.to_string()));
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification dropped: receiver closed");
        }
    }
}
