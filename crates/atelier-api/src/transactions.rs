use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use atelier_types::api::{Claims, CreateTransactionRequest, UpdateTransactionStatusRequest};
use atelier_types::events::GatewayEvent;
use atelier_types::models::{MessageKind, Party, Review, Transaction, UserRole};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 2000;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFilter {
    #[default]
    Client,
    Artist,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub role: RoleFilter,
}

/// Create a commission request: validates the artist, gets or creates the
/// pair room, inserts the transaction as REQUESTED, announces it with a
/// SYSTEM message and notifies the artist.
pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::Validation("의뢰 제목이 올바르지 않습니다".into()));
    }
    if req.description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::Validation("의뢰 설명이 너무 깁니다".into()));
    }
    if req.agreed_price.is_some_and(|p| p < 0) {
        return Err(ApiError::Validation("금액이 올바르지 않습니다".into()));
    }
    if req.artist_id == claims.sub {
        return Err(ApiError::Validation("자기 자신에게 의뢰할 수 없습니다".into()));
    }

    let db = state.db.clone();
    let client_id = claims.sub;
    let (transaction, system_message) = blocking(move || {
        let artist = db
            .get_user(req.artist_id)?
            .filter(|u| u.role == Some(UserRole::Artist))
            .ok_or_else(|| ApiError::Validation("유효하지 않은 작가입니다".into()))?;

        let room_id = db.get_or_create_pair_room(client_id, artist.id)?;
        let transaction = db.create_transaction(
            client_id,
            artist.id,
            room_id,
            &title,
            &req.description,
            req.agreed_price,
        )?;

        let system_message = db.append_message(
            room_id,
            client_id,
            &format!("새 의뢰가 요청되었습니다: {}", transaction.title),
            MessageKind::System,
            None,
        )?;

        Ok((transaction, system_message))
    })
    .await?;

    state
        .dispatcher
        .to_room(transaction.room_id, GatewayEvent::MessageReceived(system_message));
    state.dispatcher.to_room(
        transaction.room_id,
        GatewayEvent::TransactionCreated(transaction.clone()),
    );

    state
        .notifier
        .transaction_request(
            transaction.artist_id,
            &claims.nickname,
            &transaction.title,
            transaction.id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_my_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let side = match query.role {
        RoleFilter::Client => Party::Client,
        RoleFilter::Artist => Party::Artist,
    };

    let db = state.db.clone();
    let transactions = blocking(move || Ok(db.list_transactions_for(claims.sub, side)?)).await?;
    Ok(Json(transactions))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Transaction>, ApiError> {
    let db = state.db.clone();
    let transaction = blocking(move || {
        let transaction = db
            .get_transaction(id)?
            .ok_or_else(|| ApiError::NotFound("거래를 찾을 수 없습니다".into()))?;
        if transaction.party_of(claims.sub).is_none() {
            return Err(ApiError::Forbidden("이 거래에 대한 권한이 없습니다".into()));
        }
        Ok(transaction)
    })
    .await?;
    Ok(Json(transaction))
}

pub async fn get_transaction_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let db = state.db.clone();
    let reviews = blocking(move || {
        let transaction = db
            .get_transaction(id)?
            .ok_or_else(|| ApiError::NotFound("거래를 찾을 수 없습니다".into()))?;
        if transaction.party_of(claims.sub).is_none() {
            return Err(ApiError::Forbidden("이 거래에 대한 권한이 없습니다".into()));
        }
        Ok(db.reviews_for_transaction(id)?)
    })
    .await?;
    Ok(Json(reviews))
}

/// Drive the order lifecycle. Validation happens before any write; on
/// success the status and its lifecycle timestamp land in one update, the
/// room hears a SYSTEM message plus the updated transaction, and the
/// counterparty is notified.
pub async fn update_transaction_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTransactionStatusRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let db = state.db.clone();
    let actor_id = claims.sub;
    let to = req.status;

    let (updated, system_message) = blocking(move || {
        let transaction = db
            .get_transaction(id)?
            .ok_or_else(|| ApiError::NotFound("거래를 찾을 수 없습니다".into()))?;

        let party = transaction
            .party_of(actor_id)
            .ok_or_else(|| ApiError::Forbidden("이 거래에 대한 권한이 없습니다".into()))?;

        if !transaction.status.can_transition(to, party) {
            return Err(ApiError::InvalidTransition);
        }

        let updated = db.update_transaction_status(id, to)?;

        let system_message = match to.system_label() {
            Some(label) => Some(db.append_message(
                updated.room_id,
                actor_id,
                label,
                MessageKind::System,
                None,
            )?),
            None => None,
        };

        Ok((updated, system_message))
    })
    .await?;

    if let Some(message) = system_message {
        state
            .dispatcher
            .to_room(updated.room_id, GatewayEvent::MessageReceived(message));
    }
    state.dispatcher.to_room(
        updated.room_id,
        GatewayEvent::TransactionUpdated(updated.clone()),
    );

    state
        .notifier
        .transaction_status_changed(&updated, claims.sub, &claims.nickname)
        .await?;

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::test_support::{seeded_user, test_state};
    use atelier_gateway::bus::Scope;
    use atelier_types::models::{NotificationKind, TransactionStatus};

    async fn request_commission(
        state: &AppState,
        client: &Claims,
        artist: &Claims,
    ) -> Transaction {
        let (status, Json(tx)) = create_transaction(
            State(state.clone()),
            Extension(client.clone()),
            Json(CreateTransactionRequest {
                artist_id: artist.sub,
                title: "표지 일러스트".into(),
                description: "소설 표지용 일러스트입니다".into(),
                agreed_price: Some(150_000),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        tx
    }

    #[tokio::test]
    async fn creating_a_request_builds_the_room_and_notifies_the_artist() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));

        let mut rx = state.dispatcher.subscribe();
        let tx = request_commission(&state, &client, &artist).await;

        assert_eq!(tx.status, TransactionStatus::Requested);
        assert_eq!(tx.client_id, client.sub);
        assert_eq!(tx.artist_id, artist.sub);

        // Room contains exactly the two parties.
        assert!(state.db.is_member(tx.room_id, client.sub).unwrap());
        assert!(state.db.is_member(tx.room_id, artist.sub).unwrap());
        assert_eq!(state.db.room_member_ids(tx.room_id).unwrap().len(), 2);

        // SYSTEM message carries the title and was broadcast to the room.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.scope, Scope::Room(tx.room_id));
        match first.event {
            GatewayEvent::MessageReceived(message) => {
                assert_eq!(message.kind, MessageKind::System);
                assert!(message.content.contains("표지 일러스트"));
            }
            other => panic!("expected system message first, got {other:?}"),
        }

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, GatewayEvent::TransactionCreated(_)));

        // The artist hears about it on the notifications channel.
        let third = rx.recv().await.unwrap();
        assert_eq!(third.scope, Scope::User(artist.sub));
        match third.event {
            GatewayEvent::Notification(notification) => {
                assert_eq!(notification.kind, NotificationKind::TransactionRequest);
                assert!(notification.content.contains("표지 일러스트"));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reusing_the_pair_room_for_a_second_commission() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));

        let first = request_commission(&state, &client, &artist).await;
        let second = request_commission(&state, &client, &artist).await;
        assert_eq!(first.room_id, second.room_id);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn requesting_a_non_artist_is_rejected() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let not_artist = seeded_user(&state, "일반인", Some(UserRole::Client));

        let err = create_transaction(
            State(state.clone()),
            Extension(client),
            Json(CreateTransactionRequest {
                artist_id: not_artist.sub,
                title: "로고".into(),
                description: "".into(),
                agreed_price: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn artist_accepting_sets_timestamp_and_notifies_the_client() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        let tx = request_commission(&state, &client, &artist).await;

        let mut rx = state.dispatcher.subscribe();
        let Json(updated) = update_transaction_status(
            State(state.clone()),
            Path(tx.id),
            Extension(artist.clone()),
            Json(UpdateTransactionStatusRequest {
                status: TransactionStatus::Accepted,
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.status, TransactionStatus::Accepted);
        assert!(updated.accepted_at.is_some());

        let first = rx.recv().await.unwrap();
        match first.event {
            GatewayEvent::MessageReceived(message) => {
                assert_eq!(message.kind, MessageKind::System);
                assert_eq!(message.content, "의뢰가 수락되었습니다");
            }
            other => panic!("expected system message, got {other:?}"),
        }

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, GatewayEvent::TransactionUpdated(_)));

        let third = rx.recv().await.unwrap();
        assert_eq!(third.scope, Scope::User(client.sub));
        match third.event {
            GatewayEvent::Notification(notification) => {
                assert_eq!(notification.kind, NotificationKind::TransactionAccept);
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_cannot_skip_ahead_to_in_progress() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        let tx = request_commission(&state, &client, &artist).await;

        let mut rx = state.dispatcher.subscribe();
        let err = update_transaction_status(
            State(state.clone()),
            Path(tx.id),
            Extension(client),
            Json(UpdateTransactionStatusRequest {
                status: TransactionStatus::InProgress,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition));

        // State untouched, nothing broadcast, nobody notified.
        let unchanged = state.db.get_transaction(tx.id).unwrap().unwrap();
        assert_eq!(unchanged.status, TransactionStatus::Requested);
        assert!(unchanged.accepted_at.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn outsiders_are_forbidden() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        let outsider = seeded_user(&state, "불청객", None);
        let tx = request_commission(&state, &client, &artist).await;

        let err = update_transaction_status(
            State(state.clone()),
            Path(tx.id),
            Extension(outsider.clone()),
            Json(UpdateTransactionStatusRequest {
                status: TransactionStatus::Cancelled,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = get_transaction(State(state.clone()), Path(tx.id), Extension(outsider))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn either_party_may_cancel() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        let tx = request_commission(&state, &client, &artist).await;

        let Json(updated) = update_transaction_status(
            State(state.clone()),
            Path(tx.id),
            Extension(client),
            Json(UpdateTransactionStatusRequest {
                status: TransactionStatus::Cancelled,
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.status, TransactionStatus::Cancelled);
        assert!(updated.cancelled_at.is_some());

        // Terminal: the artist cannot revive it.
        let err = update_transaction_status(
            State(state.clone()),
            Path(tx.id),
            Extension(artist),
            Json(UpdateTransactionStatusRequest {
                status: TransactionStatus::Accepted,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition));
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role_filter() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        request_commission(&state, &client, &artist).await;

        let Json(as_client) = get_my_transactions(
            State(state.clone()),
            Query(TransactionsQuery {
                role: RoleFilter::Client,
            }),
            Extension(client.clone()),
        )
        .await
        .unwrap();
        assert_eq!(as_client.len(), 1);

        let Json(as_artist) = get_my_transactions(
            State(state.clone()),
            Query(TransactionsQuery {
                role: RoleFilter::Artist,
            }),
            Extension(client),
        )
        .await
        .unwrap();
        assert!(as_artist.is_empty());
    }
}
