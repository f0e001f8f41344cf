//! HTTP API: shared state, actor extraction and the router

pub mod dashboards;
pub mod forms;
pub mod review;
pub mod submissions;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::accounts::{scope, Actor, SchoolScope};
use crate::config::AppConfig;
use crate::dashboards::DashboardCache;
use crate::error::{ReportsError, Result};
use crate::submissions::{SubmissionForms, SubmissionWorkflow, TemplateManager};

pub const ACTOR_HEADER: &str = "x-user";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub cache: DashboardCache,
    pub workflow: SubmissionWorkflow,
    pub forms: SubmissionForms,
    pub templates: TemplateManager,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let cache = DashboardCache::new(Duration::from_secs(config.dashboards.cache_ttl_secs));
        Self {
            workflow: SubmissionWorkflow::new(pool.clone(), cache.clone(), config.site_url.clone()),
            forms: SubmissionForms::new(pool.clone()),
            templates: TemplateManager::new(pool.clone(), cache.clone()),
            cache,
            config: Arc::new(config),
            pool,
        }
    }
}

/// The acting user, resolved from the `x-user` header.
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ReportsError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let username = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ReportsError::Unauthorized("missing x-user header".to_string()))?;
        let actor = Actor::load(&state.pool, username).await?;
        debug!("{} {} as {}", parts.method, parts.uri.path(), actor.username);
        Ok(CurrentActor(actor))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/me", get(me))
        .route("/forms/:section_code", get(forms::open_forms))
        .route(
            "/manage/forms",
            get(forms::list_manageable).post(forms::create_template),
        )
        .route("/manage/forms/:id", axum::routing::delete(forms::delete_template))
        .route("/manage/forms/:id/schedule", post(forms::update_schedule))
        .route("/manage/forms/:id/close-today", post(forms::close_today))
        .route("/manage/forms/:id/open-today", post(forms::open_today))
        .route("/manage/forms/:id/extend", post(forms::extend_close))
        .route("/submissions/start", post(submissions::start))
        .route("/submissions/:id", get(submissions::detail))
        .route("/submissions/:id/sections/:section", axum::routing::put(submissions::save_section))
        .route("/submissions/:id/projects", post(submissions::add_project))
        .route("/projects/:id/activities", post(submissions::add_activity))
        .route("/submissions/:id/submit", post(submissions::submit))
        .route("/submissions/:id/reopen", post(submissions::reopen))
        .route("/review/:key/queue", get(review::queue))
        .route("/review/:key", get(review::detail).post(review::action))
        .route("/review/:key/tabs", get(review::readonly))
        .route("/dashboards/district-submissions", get(dashboards::district_submissions))
        .route("/dashboards/kpi", get(dashboards::kpi))
        .route("/dashboards/kpi/quarters", get(dashboards::quarters))
        .route("/dashboards/kpi/filters", get(dashboards::filters))
        .route("/dashboards/division-overview", get(dashboards::division_overview))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sgod-reports",
        "timestamp": chrono::Utc::now()
    }))
}

async fn me(State(state): State<AppState>, CurrentActor(actor): CurrentActor) -> Result<Json<Value>> {
    let scope = scope::scope_schools(&state.pool, &actor).await?;
    let scope_summary = match &scope {
        SchoolScope::All => serde_json::json!({ "all_schools": true }),
        SchoolScope::Only(ids) => serde_json::json!({ "all_schools": false, "school_ids": ids }),
    };
    let landing = actor.landing();
    Ok(Json(serde_json::json!({
        "username": actor.username,
        "roles": actor.role_names(),
        "school_id": actor.school_id,
        "district_ids": actor.district_ids,
        "section_codes": actor.allowed_section_codes(),
        "scope": scope_summary,
        "landing": landing,
        "landing_path": landing.path(),
    })))
}

/// Calendar date used for schedule checks and weekly stats.
pub(crate) fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
