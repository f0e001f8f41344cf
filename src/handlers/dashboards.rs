use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{AppState, CurrentActor};
use crate::dashboards::{
    self, filters::FilterOptions, gaps::GapsFilter, gaps::SubmissionGaps,
    overview::DivisionOverview, overview::OverviewFilter, KpiFilter, KpiPart,
};
use crate::error::{ReportsError, Result};

#[derive(Debug, Deserialize)]
pub struct PartQuery {
    pub part: String,
}

#[derive(Debug, Deserialize)]
pub struct QuartersQuery {
    pub school_year: i64,
    #[serde(default)]
    pub section_code: Option<String>,
    #[serde(default)]
    pub assessment_period: Option<String>,
}

pub async fn district_submissions(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(filter): Query<GapsFilter>,
) -> Result<Json<SubmissionGaps>> {
    let gaps = dashboards::gaps::district_submission_gaps(&state.pool, &actor, &filter).await?;
    Ok(Json(gaps))
}

pub async fn kpi(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(part): Query<PartQuery>,
    Query(filter): Query<KpiFilter>,
) -> Result<Json<Value>> {
    let part = KpiPart::from_str(&part.part)
        .ok_or_else(|| ReportsError::validation(format!("Unknown KPI part '{}'.", part.part)))?;
    let rows = dashboards::school_kpis(&state.pool, &state.cache, &actor, part, &filter).await?;
    Ok(Json(serde_json::json!({
        "part": part.as_str(),
        "label": part.label(),
        "rows": rows,
    })))
}

pub async fn quarters(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<QuartersQuery>,
) -> Result<Json<Value>> {
    let quarters = dashboards::quarter_kpis(
        &state.pool,
        &state.cache,
        &actor,
        query.school_year,
        query.section_code.as_deref().filter(|s| !s.trim().is_empty()),
        query.assessment_period.as_deref().filter(|s| !s.trim().is_empty()),
    )
    .await?;
    Ok(Json(serde_json::json!({
        "school_year": query.school_year,
        "quarters": quarters,
    })))
}

pub async fn filters(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<FilterOptions>> {
    Ok(Json(dashboards::filters::filter_options(&state.pool, &actor).await?))
}

pub async fn division_overview(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(filter): Query<OverviewFilter>,
) -> Result<Json<DivisionOverview>> {
    Ok(Json(
        dashboards::overview::division_overview(&state.pool, &actor, &filter).await?,
    ))
}
