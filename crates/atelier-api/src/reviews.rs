use axum::{Extension, Json, extract::State, http::StatusCode};

use atelier_types::api::{Claims, CreateReviewRequest};
use atelier_types::events::GatewayEvent;
use atelier_types::models::{Party, Review, ReviewKind, TransactionStatus};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

const MAX_REVIEW_CHARS: usize = 1000;

/// One review per party per completed transaction. The second review flips
/// the transaction to REVIEWED; the reviewed party is notified. Rating
/// aggregation on profiles is handled elsewhere.
pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::Validation(
            "평점은 1점에서 5점 사이여야 합니다".into(),
        ));
    }
    if req.content.chars().count() > MAX_REVIEW_CHARS {
        return Err(ApiError::Validation("후기 내용이 너무 깁니다".into()));
    }

    let db = state.db.clone();
    let author_id = claims.sub;
    let (review, reviewed_now, room_id) = blocking(move || {
        let transaction = db
            .get_transaction(req.transaction_id)?
            .ok_or_else(|| ApiError::NotFound("거래를 찾을 수 없습니다".into()))?;

        if !matches!(
            transaction.status,
            TransactionStatus::Completed | TransactionStatus::Reviewed
        ) {
            return Err(ApiError::Validation(
                "완료된 거래만 후기를 작성할 수 있습니다".into(),
            ));
        }

        let party = transaction
            .party_of(author_id)
            .ok_or_else(|| ApiError::Forbidden("이 거래에 대한 권한이 없습니다".into()))?;
        let (kind, target_id) = match party {
            Party::Client => (ReviewKind::ClientToArtist, transaction.artist_id),
            Party::Artist => (ReviewKind::ArtistToClient, transaction.client_id),
        };

        if db.review_exists(transaction.id, kind)? {
            return Err(ApiError::Validation("이미 후기를 작성했습니다".into()));
        }

        let review = db.insert_review(
            transaction.id,
            kind,
            author_id,
            target_id,
            req.rating,
            &req.content,
        )?;

        // Both sides reviewed -> the transaction is settled.
        let reviewed_now = db.count_reviews(transaction.id)? == 2
            && db.mark_transaction_reviewed(transaction.id)?;

        Ok((review, reviewed_now, transaction.room_id))
    })
    .await?;

    if reviewed_now {
        let db = state.db.clone();
        let transaction_id = review.transaction_id;
        let updated = blocking(move || {
            db.get_transaction(transaction_id)?
                .ok_or_else(|| ApiError::NotFound("거래를 찾을 수 없습니다".into()))
        })
        .await?;
        state
            .dispatcher
            .to_room(room_id, GatewayEvent::TransactionUpdated(updated));
    }

    state
        .notifier
        .review_received(
            review.target_id,
            &claims.nickname,
            review.rating,
            review.transaction_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use crate::transactions::{update_transaction_status};
    use crate::users::test_support::{seeded_user, test_state};
    use atelier_types::api::UpdateTransactionStatusRequest;
    use atelier_types::models::{Transaction, UserRole};
    use axum::extract::Path;

    async fn completed_transaction(state: &AppState, client: &Claims, artist: &Claims) -> Transaction {
        let room_id = state
            .db
            .get_or_create_pair_room(client.sub, artist.sub)
            .unwrap();
        let tx = state
            .db
            .create_transaction(client.sub, artist.sub, room_id, "캐릭터 시트", "설명", None)
            .unwrap();

        for status in [
            TransactionStatus::Accepted,
            TransactionStatus::InProgress,
            TransactionStatus::Completed,
        ] {
            update_transaction_status(
                State(state.clone()),
                Path(tx.id),
                Extension(artist.clone()),
                Json(UpdateTransactionStatusRequest { status }),
            )
            .await
            .unwrap();
        }

        state.db.get_transaction(tx.id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn second_review_flips_the_transaction_to_reviewed() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        let tx = completed_transaction(&state, &client, &artist).await;

        create_review(
            State(state.clone()),
            Extension(client.clone()),
            Json(CreateReviewRequest {
                transaction_id: tx.id,
                rating: 5,
                content: "최고였어요".into(),
            }),
        )
        .await
        .unwrap();

        // First review alone does not settle the transaction.
        let after_first = state.db.get_transaction(tx.id).unwrap().unwrap();
        assert_eq!(after_first.status, TransactionStatus::Completed);

        create_review(
            State(state.clone()),
            Extension(artist.clone()),
            Json(CreateReviewRequest {
                transaction_id: tx.id,
                rating: 4,
                content: "소통이 원활했습니다".into(),
            }),
        )
        .await
        .unwrap();

        let after_second = state.db.get_transaction(tx.id).unwrap().unwrap();
        assert_eq!(after_second.status, TransactionStatus::Reviewed);
    }

    #[tokio::test]
    async fn duplicate_and_premature_reviews_are_rejected() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));

        // Not yet completed.
        let room_id = state
            .db
            .get_or_create_pair_room(client.sub, artist.sub)
            .unwrap();
        let pending = state
            .db
            .create_transaction(client.sub, artist.sub, room_id, "포스터", "설명", None)
            .unwrap();
        let err = create_review(
            State(state.clone()),
            Extension(client.clone()),
            Json(CreateReviewRequest {
                transaction_id: pending.id,
                rating: 5,
                content: "".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let tx = completed_transaction(&state, &client, &artist).await;
        create_review(
            State(state.clone()),
            Extension(client.clone()),
            Json(CreateReviewRequest {
                transaction_id: tx.id,
                rating: 5,
                content: "좋아요".into(),
            }),
        )
        .await
        .unwrap();

        let err = create_review(
            State(state.clone()),
            Extension(client),
            Json(CreateReviewRequest {
                transaction_id: tx.id,
                rating: 3,
                content: "두 번째 시도".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn rating_must_be_in_range_and_party_scoped() {
        let state = test_state();
        let client = seeded_user(&state, "윤아", None);
        let artist = seeded_user(&state, "재민", Some(UserRole::Artist));
        let outsider = seeded_user(&state, "불청객", None);
        let tx = completed_transaction(&state, &client, &artist).await;

        let err = create_review(
            State(state.clone()),
            Extension(client),
            Json(CreateReviewRequest {
                transaction_id: tx.id,
                rating: 6,
                content: "".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = create_review(
            State(state.clone()),
            Extension(outsider),
            Json(CreateReviewRequest {
                transaction_id: tx.id,
                rating: 5,
                content: "".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
