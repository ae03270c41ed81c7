//! Notification delivery collaborator.
//!
//! The engine decides *what* to tell *whom* and *when*; a [`NotificationSink`]
//! does the actual transport. Delivery failures never fail a booking operation.

use crate::types::{GameId, NotificationId, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::RwLock;

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A game the recipient is in starts soon
    GameReminder,
    /// Someone joined the recipient's game
    PlayerJoined,
    /// Someone left the recipient's game
    PlayerLeft,
    /// A game the recipient is in was cancelled
    GameCancelled,
    /// A game the recipient is in moved
    GameUpdated,
}

impl NotificationKind {
    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GameReminder => "game_reminder",
            Self::PlayerJoined => "player_joined",
            Self::PlayerLeft => "player_left",
            Self::GameCancelled => "game_cancelled",
            Self::GameUpdated => "game_updated",
        }
    }
}

/// A message for one player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification identity
    pub id: NotificationId,
    /// Who should receive it
    pub recipient: PlayerId,
    /// Game it concerns
    pub game: GameId,
    /// What it is about
    pub kind: NotificationKind,
    /// Human-readable text
    pub message: String,
    /// When it was produced
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification with a fresh id
    #[must_use]
    pub fn new(
        recipient: PlayerId,
        game: GameId,
        kind: NotificationKind,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            game,
            kind,
            message: message.into(),
            created_at,
        }
    }
}

/// Why a delivery did not go through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport is down
    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),

    /// The transport refused this notification
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Boxed future returned by [`NotificationSink::deliver`].
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Transport for notifications (email, push, ...).
pub trait NotificationSink: Send + Sync {
    /// Hand one notification to the transport.
    fn deliver(&self, notification: Notification) -> DeliveryFuture<'_>;
}

/// Sink that writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn deliver(&self, notification: Notification) -> DeliveryFuture<'_> {
        Box::pin(async move {
            tracing::info!(
                recipient = %notification.recipient,
                game = %notification.game,
                kind = notification.kind.as_str(),
                message = %notification.message,
                "Notification"
            );
            Ok(())
        })
    }
}

/// Sink that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    sent: RwLock<Vec<Notification>>,
}

impl InMemoryOutbox {
    /// Create an empty outbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    /// Notifications delivered to `recipient`
    pub async fn sent_to(&self, recipient: PlayerId) -> Vec<Notification> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Drop everything recorded so far
    pub async fn clear(&self) {
        self.sent.write().await.clear();
    }
}

impl NotificationSink for InMemoryOutbox {
    fn deliver(&self, notification: Notification) -> DeliveryFuture<'_> {
        Box::pin(async move {
            self.sent.write().await.push(notification);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courtbook_testing::test_epoch;

    #[tokio::test]
    async fn outbox_records_in_order() {
        let outbox = InMemoryOutbox::new();
        let alice = PlayerId::new();
        let game = GameId::new();

        outbox
            .deliver(Notification::new(alice, game, NotificationKind::PlayerJoined, "one", test_epoch()))
            .await
            .unwrap();
        outbox
            .deliver(Notification::new(PlayerId::new(), game, NotificationKind::GameCancelled, "two", test_epoch()))
            .await
            .unwrap();

        let sent = outbox.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message, "one");
        assert_eq!(outbox.sent_to(alice).await.len(), 1);

        outbox.clear().await;
        assert!(outbox.sent().await.is_empty());
    }

    #[test]
    fn kinds_use_snake_case() {
        let json = serde_json::to_string(&NotificationKind::GameReminder).unwrap();
        assert_eq!(json, "\"game_reminder\"");
        assert_eq!(NotificationKind::GameUpdated.as_str(), "game_updated");
    }
}
