use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{AppState, CurrentActor};
use crate::accounts::guards;
use crate::database::models::{SmeaActivity, SmeaProject, Submission};
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};
use crate::review::{self, SubmissionDetail};
use crate::submissions::forms::{NewActivity, NewProject};
use crate::submissions::FormSection;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub template_id: i64,
    pub period_id: i64,
}

pub async fn start(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<Submission>)> {
    let (submission, created) = state
        .workflow
        .start(&actor, req.template_id, req.period_id)
        .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(submission)))
}

pub async fn detail(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<SubmissionDetail>> {
    let submission = Queries::get_submission(&state.pool, id).await?;
    guards::require_school_head(&actor, Some(submission.school_id))?;
    Ok(Json(review::load_detail(&state.pool, submission).await?))
}

pub async fn save_section(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((id, section)): Path<(i64, String)>,
    Json(payload): Json<Value>,
) -> Result<Json<SubmissionDetail>> {
    let section = FormSection::from_str(&section)
        .ok_or_else(|| ReportsError::not_found(format!("form section '{}'", section)))?;
    state.forms.save_section(&actor, id, section, payload).await?;
    let submission = Queries::get_submission(&state.pool, id).await?;
    Ok(Json(review::load_detail(&state.pool, submission).await?))
}

pub async fn add_project(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(project): Json<NewProject>,
) -> Result<(StatusCode, Json<SmeaProject>)> {
    let project = state.forms.add_project(&actor, id, project).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn add_activity(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(project_id): Path<i64>,
    Json(activity): Json<NewActivity>,
) -> Result<(StatusCode, Json<SmeaActivity>)> {
    let activity = state.forms.add_activity(&actor, project_id, activity).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn submit(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<Submission>> {
    Ok(Json(state.workflow.mark_submitted(&actor, id).await?))
}

pub async fn reopen(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<Submission>> {
    Ok(Json(state.workflow.mark_draft(&actor, id).await?))
}
