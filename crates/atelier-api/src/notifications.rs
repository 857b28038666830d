use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use atelier_types::api::{
    Claims, NotificationList, UnreadCountResponse, UpdateSettingsRequest,
};
use atelier_types::models::NotificationSettings;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_take")]
    pub take: u64,
}

fn default_take() -> u64 {
    20
}

pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationList>, ApiError> {
    let db = state.db.clone();
    let (notifications, total) = blocking(move || {
        Ok(db.list_notifications(claims.sub, query.skip, query.take.min(100))?)
    })
    .await?;
    Ok(Json(NotificationList {
        notifications,
        total,
    }))
}

pub async fn get_unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let db = state.db.clone();
    let count = blocking(move || Ok(db.unread_notification_count(claims.sub)?)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    state.notifier.mark_all_read(claims.sub).await?;
    Ok(Json(json!({ "success": true })))
}

/// Idempotent: re-reading an already-read notification changes nothing and
/// emits nothing.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    match state.notifier.mark_read(claims.sub, id).await? {
        Some(_) => Ok(Json(json!({ "success": true }))),
        None => Err(ApiError::NotFound("알림을 찾을 수 없습니다".into())),
    }
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationSettings>, ApiError> {
    let db = state.db.clone();
    let settings = blocking(move || Ok(db.get_or_create_settings(claims.sub)?)).await?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<UpdateSettingsRequest>,
) -> Result<Json<NotificationSettings>, ApiError> {
    let db = state.db.clone();
    let settings = blocking(move || Ok(db.update_settings(claims.sub, &patch)?)).await?;
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::test_support::{seeded_user, test_state};
    use atelier_types::models::NotificationKind;

    #[tokio::test]
    async fn listing_pages_and_counts() {
        let state = test_state();
        let user = seeded_user(&state, "하린", None);

        for i in 0..5 {
            state
                .db
                .insert_notification(
                    user.sub,
                    NotificationKind::ChatMessage,
                    "새 메시지",
                    &format!("메시지 {i}"),
                    None,
                )
                .unwrap();
        }

        let Json(page) = get_notifications(
            State(state.clone()),
            Query(NotificationsQuery { skip: 0, take: 3 }),
            Extension(user.clone()),
        )
        .await
        .unwrap();
        assert_eq!(page.notifications.len(), 3);
        assert_eq!(page.total, 5);

        let Json(count) = get_unread_count(State(state.clone()), Extension(user))
            .await
            .unwrap();
        assert_eq!(count.count, 5);
    }

    #[tokio::test]
    async fn mark_read_paths() {
        let state = test_state();
        let user = seeded_user(&state, "하린", None);
        let n = state
            .db
            .insert_notification(user.sub, NotificationKind::ReviewReceived, "새 후기", "5점", None)
            .unwrap();

        mark_read(State(state.clone()), Path(n.id), Extension(user.clone()))
            .await
            .unwrap();
        // Second call is a no-op, not an error.
        mark_read(State(state.clone()), Path(n.id), Extension(user.clone()))
            .await
            .unwrap();

        let err = mark_read(State(state.clone()), Path(Uuid::new_v4()), Extension(user.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        mark_all_read(State(state.clone()), Extension(user.clone()))
            .await
            .unwrap();
        let Json(count) = get_unread_count(State(state), Extension(user))
            .await
            .unwrap();
        assert_eq!(count.count, 0);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let state = test_state();
        let user = seeded_user(&state, "하린", None);

        let Json(settings) = get_settings(State(state.clone()), Extension(user.clone()))
            .await
            .unwrap();
        assert!(settings.notify_on_review);

        let Json(settings) = update_settings(
            State(state.clone()),
            Extension(user),
            Json(UpdateSettingsRequest {
                notify_on_review: Some(false),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert!(!settings.notify_on_review);
        assert!(settings.enable_in_app);
    }
}
