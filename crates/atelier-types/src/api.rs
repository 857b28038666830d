use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, TransactionStatus, UserRole};

// -- JWT Claims --

/// Bearer-token claims shared by the HTTP middleware and the WebSocket
/// upgrade handlers. Canonical definition lives here in atelier-types.
/// Token issuance is external; this core only validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub nickname: String,
    pub exp: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub target_user_id: Uuid,
}

// -- Transactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTransactionRequest {
    pub artist_id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub agreed_price: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTransactionStatusRequest {
    pub status: TransactionStatus,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub transaction_id: Uuid,
    pub rating: u8,
    pub content: String,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: u64,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub enable_in_app: Option<bool>,
    pub enable_email: Option<bool>,
    pub enable_push: Option<bool>,
    pub notify_on_message: Option<bool>,
    pub notify_on_transaction: Option<bool>,
    pub notify_on_review: Option<bool>,
}
