use axum::{Extension, Json, extract::State};

use atelier_types::api::{Claims, SetRoleRequest};
use atelier_types::models::User;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

/// Users materialize on first authenticated access from the verified
/// identity; the row carries the onboarding role thereafter.
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let db = state.db.clone();
    let user = blocking(move || Ok(db.ensure_user(claims.sub, &claims.nickname)?)).await?;
    Ok(Json(user))
}

/// Onboarding role assignment. A role is set exactly once; repeats are
/// rejected without touching the row.
pub async fn set_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<User>, ApiError> {
    let db = state.db.clone();
    let user = blocking(move || {
        db.ensure_user(claims.sub, &claims.nickname)?;
        if !db.set_role_once(claims.sub, req.role)? {
            return Err(ApiError::Validation("이미 역할이 설정되었습니다".into()));
        }
        db.get_user(claims.sub)?
            .ok_or_else(|| ApiError::NotFound("사용자를 찾을 수 없습니다".into()))
    })
    .await?;
    Ok(Json(user))
}
