use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use uuid::Uuid;

use atelier_db::Database;
use atelier_types::events::GatewayEvent;
use atelier_types::models::{
    Notification, NotificationCategory, NotificationKind, Transaction, TransactionStatus,
};

use crate::dispatcher::Dispatcher;

/// Decides, per user and per event category, whether a notification is
/// materialized and delivered. Non-suppressed deliveries persist a row, push
/// it live on the user's notifications channel and follow up with the new
/// unread count.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Returns the delivered notification, or None when the user's settings
    /// suppress this category (suppression is not an error).
    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<Notification>> {
        let db = self.db.clone();
        let title = title.to_string();
        let content = content.to_string();

        let delivered = tokio::task::spawn_blocking(move || {
            let settings = db.get_or_create_settings(user_id)?;

            if !settings.enable_in_app {
                return Ok(None);
            }
            let category_enabled = match kind.category() {
                NotificationCategory::Message => settings.notify_on_message,
                NotificationCategory::Transaction => settings.notify_on_transaction,
                NotificationCategory::Review => settings.notify_on_review,
            };
            if !category_enabled {
                return Ok(None);
            }

            let notification =
                db.insert_notification(user_id, kind, &title, &content, metadata.as_ref())?;
            let unread = db.unread_notification_count(user_id)?;
            Ok::<_, anyhow::Error>(Some((notification, unread)))
        })
        .await
        .context("notification task panicked")??;

        let Some((notification, unread)) = delivered else {
            return Ok(None);
        };

        self.dispatcher
            .to_user(user_id, GatewayEvent::Notification(notification.clone()));
        self.dispatcher
            .to_user(user_id, GatewayEvent::UnreadCount(unread));

        Ok(Some(notification))
    }

    /// Marks one notification read. None = not found for this user,
    /// Some(false) = already read (no-op, no events).
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Option<bool>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.mark_notification_read(user_id, notification_id))
            .await
            .context("notification task panicked")?
    }

    /// Marks everything read and pushes a single zero unread count.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.mark_all_notifications_read(user_id))
            .await
            .context("notification task panicked")??;

        self.dispatcher.to_user(user_id, GatewayEvent::UnreadCount(0));
        Ok(())
    }

    // -- convenience constructors used by the transaction/review/chat flows --

    pub async fn transaction_request(
        &self,
        artist_id: Uuid,
        client_nickname: &str,
        title: &str,
        transaction_id: Uuid,
    ) -> Result<()> {
        self.notify(
            artist_id,
            NotificationKind::TransactionRequest,
            "새 의뢰 요청",
            &format!("{client_nickname}님이 \"{title}\" 의뢰를 요청했습니다"),
            Some(json!({ "transaction_id": transaction_id })),
        )
        .await?;
        Ok(())
    }

    /// Counterparty notification for a status change driven by `actor_id`.
    pub async fn transaction_status_changed(
        &self,
        transaction: &Transaction,
        actor_id: Uuid,
        actor_nickname: &str,
    ) -> Result<()> {
        let Some(target) = transaction.counterparty_of(actor_id) else {
            return Ok(());
        };

        let title = &transaction.title;
        let (kind, heading, content) = match transaction.status {
            TransactionStatus::Accepted => (
                NotificationKind::TransactionAccept,
                "의뢰 수락됨",
                format!("{actor_nickname}님이 \"{title}\" 의뢰를 수락했습니다"),
            ),
            TransactionStatus::InProgress => (
                NotificationKind::TransactionStart,
                "작업 시작",
                format!("{actor_nickname}님이 \"{title}\" 작업을 시작했습니다"),
            ),
            TransactionStatus::Completed => (
                NotificationKind::TransactionComplete,
                "작업 완료",
                format!("{actor_nickname}님이 \"{title}\" 작업을 완료했습니다"),
            ),
            TransactionStatus::Cancelled => (
                NotificationKind::TransactionCancel,
                "의뢰 취소됨",
                format!("{actor_nickname}님이 \"{title}\" 의뢰를 취소했습니다"),
            ),
            TransactionStatus::Requested | TransactionStatus::Reviewed => return Ok(()),
        };

        self.notify(
            target,
            kind,
            heading,
            &content,
            Some(json!({ "transaction_id": transaction.id })),
        )
        .await?;
        Ok(())
    }

    pub async fn review_received(
        &self,
        target_id: Uuid,
        author_nickname: &str,
        rating: u8,
        transaction_id: Uuid,
    ) -> Result<()> {
        self.notify(
            target_id,
            NotificationKind::ReviewReceived,
            "새 후기",
            &format!("{author_nickname}님이 {rating}점 후기를 남겼습니다"),
            Some(json!({ "transaction_id": transaction_id })),
        )
        .await?;
        Ok(())
    }

    pub async fn chat_message(
        &self,
        user_id: Uuid,
        sender_nickname: &str,
        content: &str,
        room_id: Uuid,
    ) -> Result<()> {
        let preview: String = content.chars().take(50).collect();
        self.notify(
            user_id,
            NotificationKind::ChatMessage,
            "새 메시지",
            &format!("{sender_nickname}: {preview}"),
            Some(json!({ "room_id": room_id })),
        )
        .await?;
        Ok(())
    }
}
