//! Transient notification queue with auto-expiry.
//!
//! The queue is the only state shared across controllers. Every mutation
//! replaces the published sequence as a whole, so subscribers never observe a
//! partially edited queue.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "catalog-notify";

pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_millis(3500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationConfig {
    pub ttl: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_NOTIFICATION_TTL,
        }
    }
}

#[derive(Debug)]
struct Inner {
    queue: watch::Sender<Vec<NotificationMessage>>,
    ttl: Duration,
}

/// Handle to the notification queue. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct NotificationService {
    inner: Arc<Inner>,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}

impl NotificationService {
    pub fn new(config: NotificationConfig) -> Self {
        let (queue, _initial_rx) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                queue,
                ttl: config.ttl,
            }),
        }
    }

    /// Prepend a message and schedule its removal after the configured TTL.
    ///
    /// Identical messages are never merged; each gets its own id and timer.
    /// Must be called from within a tokio runtime for the expiry to be
    /// scheduled; outside one the message stays until dismissed.
    pub fn show(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        detail: Option<String>,
    ) -> Uuid {
        let message = NotificationMessage {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            detail,
        };
        let id = message.id;
        debug!(%id, kind = kind.as_str(), title = %message.title, "notification shown");

        self.inner.queue.send_modify(|queue| {
            let mut next = Vec::with_capacity(queue.len() + 1);
            next.push(message);
            next.append(queue);
            *queue = next;
        });

        self.schedule_expiry(id);
        id
    }

    pub fn success(&self, title: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(NotificationKind::Success, title, detail)
    }

    pub fn error(&self, title: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(NotificationKind::Error, title, detail)
    }

    pub fn info(&self, title: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(NotificationKind::Info, title, detail)
    }

    pub fn warning(&self, title: impl Into<String>, detail: Option<String>) -> Uuid {
        self.show(NotificationKind::Warning, title, detail)
    }

    /// Remove the message with `id`. Unknown ids publish nothing.
    pub fn dismiss(&self, id: Uuid) {
        Self::dismiss_in(&self.inner, id);
    }

    fn dismiss_in(inner: &Inner, id: Uuid) {
        let removed = inner.queue.send_if_modified(|queue| {
            if !queue.iter().any(|m| m.id == id) {
                return false;
            }
            *queue = queue.iter().filter(|m| m.id != id).cloned().collect();
            true
        });
        if removed {
            debug!(%id, "notification dismissed");
        }
    }

    /// Current queue, most recent first.
    pub fn snapshot(&self) -> Vec<NotificationMessage> {
        self.inner.queue.borrow().clone()
    }

    /// Receiver that always holds the latest complete queue.
    pub fn subscribe(&self) -> watch::Receiver<Vec<NotificationMessage>> {
        self.inner.queue.subscribe()
    }

    fn schedule_expiry(&self, id: Uuid) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(%id, "no tokio runtime; notification will not expire on its own");
            return;
        };
        let deadline = Instant::now() + self.inner.ttl;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                Self::dismiss_in(&inner, id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_empty() {
        let service = NotificationService::default();
        assert!(service.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn show_inserts_at_head_and_expires_after_ttl() {
        let service = NotificationService::default();
        let id = service.show(NotificationKind::Success, "Ok", Some("Detail".into()));

        let queue = service.snapshot();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, id);
        assert_eq!(queue[0].kind, NotificationKind::Success);
        assert_eq!(queue[0].title, "Ok");
        assert_eq!(queue[0].detail.as_deref(), Some("Detail"));

        tokio::time::sleep(Duration::from_millis(3499)).await;
        assert_eq!(service.snapshot().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(service.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_messages_are_prepended() {
        let service = NotificationService::default();
        let first = service.info("first", None);
        let second = service.error("second", None);

        let ids: Vec<_> = service.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_messages_are_independent() {
        let service = NotificationService::default();
        let a = service.warning("same", None);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let b = service.warning("same", None);
        assert_ne!(a, b);
        assert_eq!(service.snapshot().len(), 2);

        tokio::time::sleep(Duration::from_millis(2600)).await;
        let remaining: Vec<_> = service.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(remaining, vec![b]);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(service.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_removes_by_id_and_ignores_unknown_ids() {
        let service = NotificationService::default();
        let keep = service.info("keep", None);
        let drop_me = service.info("drop", None);

        service.dismiss(drop_me);
        let ids: Vec<_> = service.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![keep]);

        let mut rx = service.subscribe();
        rx.borrow_and_update();
        service.dismiss(Uuid::new_v4());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(service.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_every_mutation() {
        let service = NotificationService::default();
        let mut rx = service.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        let id = service.success("saved", None);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        service.dismiss(id);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_dismiss_before_expiry_is_harmless() {
        let service = NotificationService::new(NotificationConfig {
            ttl: Duration::from_millis(50),
        });
        let id = service.info("short", None);
        service.dismiss(id);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(service.snapshot().is_empty());
    }

    #[test]
    fn show_without_runtime_keeps_message() {
        let service = NotificationService::default();
        service.info("no runtime", None);
        assert_eq!(service.snapshot().len(), 1);
    }
}
