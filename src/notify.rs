use std::fmt;
use tokio::sync::mpsc;

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Success,
  Error,
}

/// A dismissible notice for the user, raised by hooks at their boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: Level,
  pub title: String,
  pub message: String,
}

impl fmt::Display for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = match self.level {
      Level::Success => "ok",
      Level::Error => "error",
    };
    if self.message.is_empty() {
      write!(f, "[{}] {}", tag, self.title)
    } else {
      write!(f, "[{}] {}: {}", tag, self.title, self.message)
    }
  }
}

/// Sending half, cloned into every hook that reports to the user
#[derive(Debug, Clone)]
pub struct Notifier {
  tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
  /// Create a notifier and the receiver the front-end drains
  pub fn channel() -> (Self, Notifications) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, Notifications { rx })
  }

  pub fn success(&self, title: impl Into<String>, message: impl Into<String>) {
    self.send(Level::Success, title.into(), message.into());
  }

  pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
    self.send(Level::Error, title.into(), message.into());
  }

  fn send(&self, level: Level, title: String, message: String) {
    // Ignore send errors - the front-end may already be gone
    let _ = self.tx.send(Notification {
      level,
      title,
      message,
    });
  }
}

/// Receiving half of the notification channel
pub struct Notifications {
  rx: mpsc::UnboundedReceiver<Notification>,
}

impl Notifications {
  /// Take everything queued so far without waiting
  pub fn drain(&mut self) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = self.rx.try_recv() {
      out.push(n);
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_drain_in_order() {
    let (notifier, mut notifications) = Notifier::channel();
    notifier.success("Lead updated", "");
    notifier.error("Search failed", "customers: timeout");

    let drained = notifications.drain();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].to_string(), "[ok] Lead updated");
    assert_eq!(drained[1].to_string(), "[error] Search failed: customers: timeout");
    assert!(notifications.drain().is_empty());
  }
}
