//! Row-to-model mapping. Each query selects the canonical column list for an
//! entity and maps it with the matching function here. Corrupt stored values
//! are logged and replaced with defaults rather than failing the whole page,
//! matching how the rest of the read path treats damaged rows.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use tracing::warn;
use uuid::Uuid;

use atelier_types::models::{
    Message, MessageKind, Notification, NotificationChannel, NotificationKind,
    NotificationSettings, Review, ReviewKind, Transaction, TransactionStatus, User, UserRole,
};

pub const MESSAGE_COLS: &str = "id, room_id, sender_id, kind, content, file_url, created_at";
pub const TRANSACTION_COLS: &str = "id, client_id, artist_id, room_id, title, description, \
     agreed_price, status, created_at, accepted_at, completed_at, cancelled_at";
pub const REVIEW_COLS: &str =
    "id, transaction_id, kind, author_id, target_id, rating, content, created_at";
pub const NOTIFICATION_COLS: &str = "id, user_id, kind, title, content, metadata, is_read, \
     read_at, sent_channels, created_at";

pub(crate) fn parse_uuid(s: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}': {}", s, e);
        Uuid::default()
    })
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite-style "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

pub(crate) fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_ts(&s))
}

pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let role: Option<String> = row.get(2)?;
    let created_at: String = row.get(3)?;
    Ok(User {
        id: parse_uuid(&id),
        nickname: row.get(1)?,
        role: role.as_deref().and_then(UserRole::from_db),
        created_at: parse_ts(&created_at),
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let room_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let kind: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(Message {
        id: parse_uuid(&id),
        room_id: parse_uuid(&room_id),
        sender_id: parse_uuid(&sender_id),
        kind: MessageKind::from_db(&kind).unwrap_or_else(|| {
            warn!("Corrupt message kind '{}' on message '{}'", kind, id);
            MessageKind::Text
        }),
        content: row.get(4)?,
        file_url: row.get(5)?,
        created_at: parse_ts(&created_at),
    })
}

pub(crate) fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let id: String = row.get(0)?;
    let client_id: String = row.get(1)?;
    let artist_id: String = row.get(2)?;
    let room_id: String = row.get(3)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(Transaction {
        id: parse_uuid(&id),
        client_id: parse_uuid(&client_id),
        artist_id: parse_uuid(&artist_id),
        room_id: parse_uuid(&room_id),
        title: row.get(4)?,
        description: row.get(5)?,
        agreed_price: row.get(6)?,
        status: TransactionStatus::from_db(&status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on transaction '{}'", status, id);
            TransactionStatus::Requested
        }),
        created_at: parse_ts(&created_at),
        accepted_at: parse_opt_ts(row.get(9)?),
        completed_at: parse_opt_ts(row.get(10)?),
        cancelled_at: parse_opt_ts(row.get(11)?),
    })
}

pub(crate) fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let id: String = row.get(0)?;
    let transaction_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let author_id: String = row.get(3)?;
    let target_id: String = row.get(4)?;
    let rating: i64 = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(Review {
        id: parse_uuid(&id),
        transaction_id: parse_uuid(&transaction_id),
        kind: ReviewKind::from_db(&kind).unwrap_or_else(|| {
            warn!("Corrupt review kind '{}' on review '{}'", kind, id);
            ReviewKind::ClientToArtist
        }),
        author_id: parse_uuid(&author_id),
        target_id: parse_uuid(&target_id),
        rating: rating.clamp(0, u8::MAX as i64) as u8,
        content: row.get(6)?,
        created_at: parse_ts(&created_at),
    })
}

pub(crate) fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let metadata: Option<String> = row.get(5)?;
    let is_read: i64 = row.get(6)?;
    let sent_channels: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(Notification {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        kind: NotificationKind::from_db(&kind).unwrap_or_else(|| {
            warn!("Corrupt notification kind '{}' on '{}'", kind, id);
            NotificationKind::ChatMessage
        }),
        title: row.get(3)?,
        content: row.get(4)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        is_read: is_read != 0,
        read_at: parse_opt_ts(row.get(7)?),
        sent_channels: serde_json::from_str::<Vec<NotificationChannel>>(&sent_channels)
            .unwrap_or_default(),
        created_at: parse_ts(&created_at),
    })
}

pub(crate) fn settings_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationSettings> {
    let user_id: String = row.get(0)?;
    let flags: [i64; 6] = [
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ];
    Ok(NotificationSettings {
        user_id: parse_uuid(&user_id),
        enable_in_app: flags[0] != 0,
        enable_email: flags[1] != 0,
        enable_push: flags[2] != 0,
        notify_on_message: flags[3] != 0,
        notify_on_transaction: flags[4] != 0,
        notify_on_review: flags[5] != 0,
    })
}
