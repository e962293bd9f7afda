//! Notification delivery from the host page.
//!
//! The host pushes [`Notification`]s through a bounded channel; the page
//! loop receives and applies them one at a time, so recording never runs
//! concurrently with itself.

use crate::adapter::{Notification, PageAction, PageSession};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;

/// Errors raised when pushing a notification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Notification queue is full")]
    Full,

    #[error("Notification queue is closed")]
    Closed,
}

/// Bounded queue of host notifications.
pub struct NotificationChannel {
    sender: Sender<Notification>,
    receiver: Receiver<Notification>,
}

impl NotificationChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// A handle the host side can push notifications through.
    pub fn sender(&self) -> NotificationSender {
        NotificationSender {
            sender: self.sender.clone(),
        }
    }

    /// Apply every queued notification to the page, in arrival order.
    pub fn drain_into(&self, page: &mut PageSession) -> Vec<PageAction> {
        self.receiver
            .try_iter()
            .map(|n| page.handle(n))
            .filter(|action| *action != PageAction::None)
            .collect()
    }

    /// Drop the channel's own sender and keep only the receiving end.
    ///
    /// Use this when all notifications come from [`NotificationSender`]s,
    /// so the receiver disconnects once they are all dropped.
    pub fn into_receiver(self) -> Receiver<Notification> {
        self.receiver
    }
}

/// Host-side handle for pushing notifications.
#[derive(Clone)]
pub struct NotificationSender {
    sender: Sender<Notification>,
}

impl NotificationSender {
    /// Push without blocking; a full queue drops the notification.
    pub fn notify(&self, notification: Notification) -> Result<(), SourceError> {
        self.sender.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => SourceError::Full,
            TrySendError::Disconnected(_) => SourceError::Closed,
        })
    }

    /// Push, waiting for room in the queue.
    pub fn notify_blocking(&self, notification: Notification) -> Result<(), SourceError> {
        self.sender
            .send(notification)
            .map_err(|_| SourceError::Closed)
    }
}
