//! Options for the KPI dashboard filter bar.

use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::SqlitePool;

use super::calculator::KpiPart;
use crate::accounts::{scope, Actor};
use crate::database::models::District;
use crate::database::queries::Queries;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption<V: Serialize> {
    pub value: V,
    pub label: String,
}

impl<V: Serialize> FilterOption<V> {
    fn new(value: V, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub school_years: Vec<FilterOption<i64>>,
    pub quarters: Vec<FilterOption<&'static str>>,
    pub districts: Vec<District>,
    pub kpi_parts: Vec<FilterOption<&'static str>>,
    pub assessment_periods: Vec<FilterOption<&'static str>>,
}

pub const ASSESSMENT_PERIODS: [(&str, &str); 3] = [
    ("bosy", "Beginning of School Year"),
    ("mosy", "Middle of School Year"),
    ("eosy", "End of School Year"),
];

pub fn school_year_options(years: impl IntoIterator<Item = i64>) -> Vec<FilterOption<i64>> {
    let years: BTreeSet<i64> = years.into_iter().collect();
    years
        .into_iter()
        .rev()
        .map(|y| FilterOption::new(y, format!("SY {}-{}", y, y + 1)))
        .collect()
}

pub fn quarter_options() -> Vec<FilterOption<&'static str>> {
    let mut quarters = vec![FilterOption::new("", "All Quarters")];
    quarters.extend(
        [("Q1", "Quarter 1"), ("Q2", "Quarter 2"), ("Q3", "Quarter 3"), ("Q4", "Quarter 4")]
            .into_iter()
            .map(|(value, label)| FilterOption::new(value, label)),
    );
    quarters
}

pub async fn filter_options(pool: &SqlitePool, actor: &Actor) -> Result<FilterOptions> {
    let periods = Queries::list_periods(pool).await?;
    let all_districts = Queries::list_districts(pool).await?;

    let districts = if actor.is_sgod_admin() {
        all_districts
    } else if actor.is_psds() {
        all_districts
            .into_iter()
            .filter(|d| actor.district_ids.contains(&d.id))
            .collect()
    } else {
        let scope = scope::scope_schools(pool, actor).await?;
        let schools = scope.filter_schools(Queries::list_schools(pool).await?);
        let ids: BTreeSet<i64> = schools.iter().filter_map(|s| s.district_id).collect();
        all_districts
            .into_iter()
            .filter(|d| ids.contains(&d.id))
            .collect()
    };

    Ok(FilterOptions {
        school_years: school_year_options(periods.iter().map(|p| p.school_year_start)),
        quarters: quarter_options(),
        districts,
        kpi_parts: KpiPart::ALL
            .iter()
            .map(|part| FilterOption::new(part.as_str(), part.label()))
            .collect(),
        assessment_periods: ASSESSMENT_PERIODS
            .iter()
            .map(|(value, label)| FilterOption::new(*value, *label))
            .collect(),
    })
}
