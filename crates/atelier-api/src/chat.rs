use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use atelier_types::api::{Claims, CreateRoomRequest};
use atelier_types::models::{Message, Room};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Message id of the oldest message from the previous page (exclusive).
    pub cursor: Option<Uuid>,
    #[serde(default = "default_take")]
    pub take: u32,
}

fn default_take() -> u32 {
    50
}

pub async fn get_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Room>>, ApiError> {
    let db = state.db.clone();
    let rooms = blocking(move || Ok(db.list_rooms(claims.sub)?)).await?;
    Ok(Json(rooms))
}

/// Get or create the 1:1 room with another user (the "request chat with
/// artist" path). At most one room exists per unordered pair.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    if req.target_user_id == claims.sub {
        return Err(ApiError::Validation(
            "자기 자신과의 채팅방은 만들 수 없습니다".into(),
        ));
    }

    let db = state.db.clone();
    let room = blocking(move || {
        if db.get_user(req.target_user_id)?.is_none() {
            return Err(ApiError::NotFound("사용자를 찾을 수 없습니다".into()));
        }
        let room_id = db.get_or_create_pair_room(claims.sub, req.target_user_id)?;
        db.get_room(room_id)?
            .ok_or_else(|| ApiError::NotFound("채팅방을 찾을 수 없습니다".into()))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

/// Cursor-paged message history, oldest-first within the page. Fetching a
/// page also marks the room read for the caller, like opening the
/// conversation does.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let db = state.db.clone();
    let messages = blocking(move || {
        if !db.is_member(room_id, claims.sub)? {
            return Err(ApiError::Forbidden("채팅방에 접근할 수 없습니다".into()));
        }

        let messages = db.messages_page(room_id, query.cursor, query.take)?;
        db.mark_read(room_id, claims.sub)?;
        Ok(messages)
    })
    .await?;

    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::test_support::{seeded_user, test_state};
    use atelier_types::models::MessageKind;

    #[tokio::test]
    async fn create_room_is_idempotent_per_pair() {
        let state = test_state();
        let client = seeded_user(&state, "민서", None);
        let artist = seeded_user(&state, "준호", None);

        let (status, Json(first)) = create_room(
            State(state.clone()),
            Extension(client.clone()),
            Json(CreateRoomRequest {
                target_user_id: artist.sub,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first.members.len(), 2);

        let (_, Json(second)) = create_room(
            State(state.clone()),
            Extension(client),
            Json(CreateRoomRequest {
                target_user_id: artist.sub,
            }),
        )
        .await
        .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn create_room_rejects_self_and_unknown_target() {
        let state = test_state();
        let user = seeded_user(&state, "민서", None);

        let err = create_room(
            State(state.clone()),
            Extension(user.clone()),
            Json(CreateRoomRequest {
                target_user_id: user.sub,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = create_room(
            State(state.clone()),
            Extension(user),
            Json(CreateRoomRequest {
                target_user_id: Uuid::new_v4(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_members_cannot_read_messages() {
        let state = test_state();
        let a = seeded_user(&state, "민서", None);
        let b = seeded_user(&state, "준호", None);
        let outsider = seeded_user(&state, "불청객", None);

        let room_id = state.db.get_or_create_pair_room(a.sub, b.sub).unwrap();
        state
            .db
            .append_message(room_id, a.sub, "비밀 이야기", MessageKind::Text, None)
            .unwrap();

        let err = get_messages(
            State(state.clone()),
            Path(room_id),
            Query(MessagesQuery {
                cursor: None,
                take: 50,
            }),
            Extension(outsider),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let Json(messages) = get_messages(
            State(state.clone()),
            Path(room_id),
            Query(MessagesQuery {
                cursor: None,
                take: 50,
            }),
            Extension(b),
        )
        .await
        .unwrap();
        assert_eq!(messages.len(), 1);
    }
}
