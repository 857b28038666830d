use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Artist,
    Client,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "ARTIST",
            Self::Client => "CLIENT",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "ARTIST" => Some(Self::Artist),
            "CLIENT" => Some(Self::Client),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    /// None until onboarding assigns a role; assigned exactly once.
    pub role: Option<UserRole>,
    pub created_at: DateTime<Utc>,
}

// -- Rooms --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMemberInfo {
    pub user_id: Uuid,
    pub nickname: String,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub members: Vec<RoomMemberInfo>,
    pub transaction: Option<TransactionSummary>,
    pub last_message: Option<Message>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::File => "FILE",
            Self::System => "SYSTEM",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(Self::Text),
            "IMAGE" => Some(Self::Image),
            "FILE" => Some(Self::File),
            "SYSTEM" => Some(Self::System),
            _ => None,
        }
    }
}

/// A chat message. Immutable once created; ordering is by `created_at` with
/// the persistence layer's insertion sequence breaking ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Transactions --

/// Which side of a transaction an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Client,
    Artist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Requested,
    Accepted,
    InProgress,
    Completed,
    Reviewed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Accepted => "ACCEPTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Reviewed => "REVIEWED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(Self::Requested),
            "ACCEPTED" => Some(Self::Accepted),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "REVIEWED" => Some(Self::Reviewed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether `actor` may move a transaction from `self` to `to`.
    ///
    /// Forward progress (accept, start, complete) is artist-only;
    /// cancellation is open to either party while the transaction is live.
    /// `Reviewed` is never reachable through here — it is set by the review
    /// flow once both parties have reviewed a completed transaction.
    pub fn can_transition(&self, to: TransactionStatus, actor: Party) -> bool {
        use TransactionStatus::*;

        let allowed = match (*self, to) {
            (Requested, Accepted) => true,
            (Requested, Cancelled) => true,
            (Accepted, InProgress) => true,
            (Accepted, Cancelled) => true,
            (InProgress, Completed) => true,
            (InProgress, Cancelled) => true,
            _ => false,
        };

        if !allowed {
            return false;
        }

        match to {
            Accepted | InProgress | Completed => actor == Party::Artist,
            _ => true,
        }
    }

    /// Human-readable system-message body announced in the chat room when a
    /// transaction enters this status.
    pub fn system_label(&self) -> Option<&'static str> {
        match self {
            Self::Accepted => Some("의뢰가 수락되었습니다"),
            Self::InProgress => Some("작업이 시작되었습니다"),
            Self::Completed => Some("작업이 완료되었습니다"),
            Self::Cancelled => Some("의뢰가 취소되었습니다"),
            Self::Requested | Self::Reviewed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Reviewed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub client_id: Uuid,
    pub artist_id: Uuid,
    pub room_id: Uuid,
    pub title: String,
    pub description: String,
    pub agreed_price: Option<i64>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Which party `user_id` is, if any.
    pub fn party_of(&self, user_id: Uuid) -> Option<Party> {
        if user_id == self.artist_id {
            Some(Party::Artist)
        } else if user_id == self.client_id {
            Some(Party::Client)
        } else {
            None
        }
    }

    /// The member on the other side of the transaction from `user_id`.
    pub fn counterparty_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.party_of(user_id)? {
            Party::Artist => Some(self.client_id),
            Party::Client => Some(self.artist_id),
        }
    }
}

/// Slim transaction view embedded in room listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub id: Uuid,
    pub title: String,
    pub status: TransactionStatus,
}

// -- Reviews --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewKind {
    ClientToArtist,
    ArtistToClient,
}

impl ReviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientToArtist => "CLIENT_TO_ARTIST",
            Self::ArtistToClient => "ARTIST_TO_CLIENT",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "CLIENT_TO_ARTIST" => Some(Self::ClientToArtist),
            "ARTIST_TO_CLIENT" => Some(Self::ArtistToClient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub transaction_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ReviewKind,
    pub author_id: Uuid,
    pub target_id: Uuid,
    pub rating: u8,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ChatMessage,
    TransactionRequest,
    TransactionAccept,
    TransactionStart,
    TransactionComplete,
    TransactionCancel,
    ReviewReceived,
}

/// Per-user opt-out granularity for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Message,
    Transaction,
    Review,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "CHAT_MESSAGE",
            Self::TransactionRequest => "TRANSACTION_REQUEST",
            Self::TransactionAccept => "TRANSACTION_ACCEPT",
            Self::TransactionStart => "TRANSACTION_START",
            Self::TransactionComplete => "TRANSACTION_COMPLETE",
            Self::TransactionCancel => "TRANSACTION_CANCEL",
            Self::ReviewReceived => "REVIEW_RECEIVED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "CHAT_MESSAGE" => Some(Self::ChatMessage),
            "TRANSACTION_REQUEST" => Some(Self::TransactionRequest),
            "TRANSACTION_ACCEPT" => Some(Self::TransactionAccept),
            "TRANSACTION_START" => Some(Self::TransactionStart),
            "TRANSACTION_COMPLETE" => Some(Self::TransactionComplete),
            "TRANSACTION_CANCEL" => Some(Self::TransactionCancel),
            "REVIEW_RECEIVED" => Some(Self::ReviewReceived),
            _ => None,
        }
    }

    pub fn category(&self) -> NotificationCategory {
        match self {
            Self::ChatMessage => NotificationCategory::Message,
            Self::TransactionRequest
            | Self::TransactionAccept
            | Self::TransactionStart
            | Self::TransactionComplete
            | Self::TransactionCancel => NotificationCategory::Transaction,
            Self::ReviewReceived => NotificationCategory::Review,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    InApp,
    Email,
    Push,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "IN_APP",
            Self::Email => "EMAIL",
            Self::Push => "PUSH",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub sent_channels: Vec<NotificationChannel>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: Uuid,
    pub enable_in_app: bool,
    pub enable_email: bool,
    pub enable_push: bool,
    pub notify_on_message: bool,
    pub notify_on_transaction: bool,
    pub notify_on_review: bool,
}
