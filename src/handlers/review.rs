use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use super::{today, AppState, CurrentActor};
use crate::database::models::Submission;
use crate::error::Result;
use crate::review::{self, QueueFilter, ReviewAction, ReviewQueue, SubmissionDetail};

pub async fn queue(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(section_code): Path<String>,
    Query(filter): Query<QueueFilter>,
) -> Result<Json<ReviewQueue>> {
    let queue = review::review_queue(&state.pool, &actor, &section_code, &filter, today()).await?;
    Ok(Json(queue))
}

pub async fn detail(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionDetail>> {
    Ok(Json(review::review_detail(&state.pool, &actor, id).await?))
}

pub async fn action(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(action): Json<ReviewAction>,
) -> Result<Json<Submission>> {
    Ok(Json(
        review::review_action(&state.workflow, &actor, id, &action).await?,
    ))
}

pub async fn readonly(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionDetail>> {
    Ok(Json(review::readonly_view(&state.pool, &actor, id).await?))
}
