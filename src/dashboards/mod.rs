//! KPI dashboards, district submission gaps and the division overview

pub mod cache;
pub mod calculator;
pub mod filters;
pub mod gaps;
pub mod kpi;
pub mod overview;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::accounts::{scope, Actor, SchoolScope};
use crate::error::{ReportsError, Result};

pub use cache::DashboardCache;
pub use calculator::{KpiFilter, KpiPart};

/// Scope component of a cache key, so actors with different scopes never
/// share a payload.
fn scope_key(scope: &SchoolScope) -> String {
    match scope {
        SchoolScope::All => "all".to_string(),
        SchoolScope::Only(ids) => ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

async fn cached<T, F>(
    cache: &DashboardCache,
    key: String,
    school_id: Option<i64>,
    compute: F,
) -> Result<serde_json::Value>
where
    T: Serialize,
    F: std::future::Future<Output = Result<T>>,
{
    if let Some(hit) = cache.get(&key).await {
        debug!("Dashboard cache hit: {}", key);
        return Ok(hit);
    }
    let value = serde_json::to_value(compute.await?)?;
    cache.put(key, school_id, value.clone()).await;
    Ok(value)
}

/// Per-school rows of one KPI part, served from the cache when fresh.
pub async fn school_kpis(
    pool: &SqlitePool,
    cache: &DashboardCache,
    actor: &Actor,
    part: KpiPart,
    filter: &KpiFilter,
) -> Result<serde_json::Value> {
    let scope = scope::scope_schools(pool, actor).await?;
    if scope.is_empty() {
        return Err(ReportsError::forbidden("No schools are visible to this account."));
    }
    let key = format!("{}|scope={}", filter.cache_key(part), scope_key(&scope));
    cached(
        cache,
        key,
        filter.school_id,
        calculator::school_kpis(pool, &scope, part, filter),
    )
    .await
}

/// Division KPIs for each active quarter of a school year.
pub async fn quarter_kpis(
    pool: &SqlitePool,
    cache: &DashboardCache,
    actor: &Actor,
    school_year: i64,
    section_code: Option<&str>,
    assessment_period: Option<&str>,
) -> Result<serde_json::Value> {
    let scope = scope::scope_schools(pool, actor).await?;
    if scope.is_empty() {
        return Err(ReportsError::forbidden("No schools are visible to this account."));
    }
    let key = format!(
        "quarters|sy={}|sec={}|ap={}|scope={}",
        school_year,
        section_code.unwrap_or(calculator::DEFAULT_SECTION_CODE),
        assessment_period.unwrap_or(calculator::DEFAULT_ASSESSMENT_PERIOD),
        scope_key(&scope)
    );
    cached(
        cache,
        key,
        None,
        calculator::kpis_for_quarters(pool, &scope, school_year, section_code, assessment_period),
    )
    .await
}
