use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{today, AppState, CurrentActor};
use crate::database::models::FormTemplate;
use crate::error::Result;
use crate::submissions::templates::{self, NewTemplate, OpenForms, ScheduleUpdate};

#[derive(Debug, Default, Deserialize)]
pub struct SectionQuery {
    #[serde(default)]
    pub section: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendRequest {
    #[serde(default)]
    pub days: Option<i64>,
}

pub async fn open_forms(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(section_code): Path<String>,
) -> Result<Json<OpenForms>> {
    let forms = templates::open_forms(&state.pool, &actor, &section_code, today()).await?;
    Ok(Json(forms))
}

pub async fn list_manageable(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<SectionQuery>,
) -> Result<Json<Vec<FormTemplate>>> {
    let section = query.section.as_deref().filter(|s| !s.trim().is_empty());
    Ok(Json(state.templates.list_manageable(&actor, section).await?))
}

pub async fn create_template(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<NewTemplate>,
) -> Result<(StatusCode, Json<FormTemplate>)> {
    let template = state.templates.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    Json(update): Json<ScheduleUpdate>,
) -> Result<Json<FormTemplate>> {
    Ok(Json(state.templates.update_schedule(&actor, id, update).await?))
}

pub async fn close_today(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<FormTemplate>> {
    Ok(Json(state.templates.close_today(&actor, id, today()).await?))
}

pub async fn open_today(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<FormTemplate>> {
    Ok(Json(state.templates.open_today(&actor, id, today()).await?))
}

pub async fn extend_close(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
    body: Option<Json<ExtendRequest>>,
) -> Result<Json<FormTemplate>> {
    let days = body.and_then(|Json(req)| req.days);
    Ok(Json(state.templates.extend_close(&actor, id, days, today()).await?))
}

pub async fn delete_template(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let removed = state.templates.delete(&actor, id).await?;
    info!("Template {} deleted by {} ({} submission(s))", id, actor.username, removed);
    Ok(Json(serde_json::json!({
        "deleted": id,
        "submissions_removed": removed,
    })))
}
