use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    db,
    error::{AppError, AppResult, Entity, Invalid},
    models::{ApiResponse, CreateReviewRequest, Review},
    AppState,
};

use super::{ApiJson, ApiPath};

const MAX_COMMENT_CHARS: usize = 1000;

/// GET /api/masters/{id}/reviews
pub async fn list_master_reviews(
    State(state): State<Arc<AppState>>,
    ApiPath(master_id): ApiPath<i64>,
) -> AppResult<Json<ApiResponse<Vec<Review>>>> {
    db::masters::find_by_id(&state.db, master_id)
        .await?
        .ok_or(AppError::NotFound(Entity::Master))?;
    let reviews = db::reviews::list_for_master(&state.db, master_id).await?;
    Ok(Json(ApiResponse::success(reviews)))
}

/// POST /api/reviews: one review per completed visit to that master.
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Review>>)> {
    if !(1..=5).contains(&body.rating) {
        return Err(Invalid::Format("rating").into());
    }
    let comment = body
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if comment.is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS) {
        return Err(Invalid::Format("comment").into());
    }

    db::masters::find_by_id(&state.db, body.master_id)
        .await?
        .ok_or(AppError::NotFound(Entity::Master))?;
    let visit =
        db::appointments::unreviewed_completed_with_master(&state.db, user.id, body.master_id)
            .await?;
    let Some(appointment_id) = visit else {
        let visited =
            db::appointments::last_completed_with_master(&state.db, user.id, body.master_id)
                .await?
                .is_some();
        return Err(if visited {
            Invalid::AlreadyReviewed
        } else {
            Invalid::ReviewWithoutVisit
        }
        .into());
    };

    let inserted = db::reviews::insert(
        &state.db,
        user.id,
        body.master_id,
        Some(appointment_id),
        body.rating,
        comment,
    )
    .await;
    let id = match inserted {
        Ok(id) => id,
        // A concurrent request reviewed the same visit.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(Invalid::AlreadyReviewed.into());
        }
        Err(e) => return Err(e.into()),
    };
    let rating = db::masters::refresh_rating(&state.db, body.master_id).await?;
    tracing::info!(review_id = id, master_id = body.master_id, rating, "review added");

    let review = db::reviews::find(&state.db, id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(review))))
}
