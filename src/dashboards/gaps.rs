//! Which schools in each district still owe a given form for a period.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::accounts::{guards, scope, Actor};
use crate::database::models::{District, FormTemplate, Period, School, Section};
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};
use crate::organizations::Directory;
use crate::submissions::SubmissionStatus;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GapsFilter {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub form_code: Option<String>,
    #[serde(default)]
    pub period_id: Option<i64>,
    #[serde(default)]
    pub district_id: Option<i64>,
}

/// Contact details shown for a school that has not submitted.
#[derive(Debug, Clone, Serialize)]
pub struct MissingSchool {
    pub school: School,
    pub head_name: String,
    pub head_contact: String,
    pub strands: String,
    pub missing_profile: bool,
    pub missing_head_name: bool,
    pub missing_head_contact: bool,
}

impl MissingSchool {
    pub fn new(school: &School, directory: &Directory) -> Self {
        let profile = directory.profile(school.id);
        let head_name = profile.map(|p| p.head_name.clone()).unwrap_or_default();
        let head_contact = profile.map(|p| p.head_contact.clone()).unwrap_or_default();
        Self {
            school: school.clone(),
            strands: profile.map(|p| p.strands.join(", ")).unwrap_or_default(),
            missing_profile: profile.is_none(),
            missing_head_name: head_name.trim().is_empty(),
            missing_head_contact: head_contact.trim().is_empty(),
            head_name,
            head_contact,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictGap {
    pub district: Option<District>,
    pub district_name: String,
    pub total_schools: usize,
    pub submitted_count: usize,
    pub missing_count: usize,
    pub missing_schools: Vec<MissingSchool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionGaps {
    pub sections: Vec<Section>,
    pub selected_section: Option<Section>,
    pub form_templates: Vec<FormTemplate>,
    pub selected_form: Option<FormTemplate>,
    pub periods: Vec<Period>,
    pub selected_period: Option<Period>,
    pub districts: Vec<District>,
    pub selected_district_id: Option<i64>,
    pub district_rows: Vec<DistrictGap>,
    pub total_schools: usize,
    pub total_submitted: usize,
    pub total_missing: usize,
}

/// Scoped districts that own at least one of the given schools, by name.
pub fn districts_of(schools: &[School], directory: &Directory) -> Vec<District> {
    let ids: HashSet<i64> = schools.iter().filter_map(|s| s.district_id).collect();
    let mut districts: Vec<District> = directory
        .districts
        .values()
        .filter(|d| ids.contains(&d.id))
        .cloned()
        .collect();
    districts.sort_by(|a, b| a.name.cmp(&b.name));
    districts
}

/// School ids with a completed submission for the template and period.
async fn completed_school_ids(
    pool: &SqlitePool,
    template_id: i64,
    period_id: i64,
) -> Result<HashSet<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT DISTINCT school_id FROM submissions
        WHERE form_template_id = ? AND period_id = ? AND status IN (?, ?)
        "#,
    )
    .bind(template_id)
    .bind(period_id)
    .bind(SubmissionStatus::Submitted.as_str())
    .bind(SubmissionStatus::Noted.as_str())
    .fetch_all(pool)
    .await?;
    Ok(ids.into_iter().collect())
}

pub async fn district_submission_gaps(
    pool: &SqlitePool,
    actor: &Actor,
    filter: &GapsFilter,
) -> Result<SubmissionGaps> {
    guards::require_reviewer(actor)?;

    let sections = Queries::list_sections(pool).await?;
    let section = match filter.section.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(code) => Some(Queries::get_section_by_code(pool, code).await?),
        None => sections.first().cloned(),
    };

    let form_templates = match &section {
        Some(section) => Queries::list_form_templates_for_section(pool, section.id).await?,
        None => Vec::new(),
    };
    let selected_form = match filter.form_code.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(code) => Some(
            form_templates
                .iter()
                .find(|t| t.code == code)
                .cloned()
                .ok_or_else(|| ReportsError::not_found(format!("form template '{}'", code)))?,
        ),
        None => form_templates.first().cloned(),
    };

    let periods = Queries::list_periods(pool).await?;
    let selected_period = match filter.period_id {
        Some(id) => Some(Queries::get_period(pool, id).await?),
        None => periods.first().cloned(),
    };

    let directory = Directory::load(pool).await?;
    let visible = scope::scope_schools(pool, actor)
        .await?
        .filter_schools(directory.schools.clone());
    let districts = districts_of(&visible, &directory);
    let schools: Vec<School> = visible
        .into_iter()
        .filter(|s| filter.district_id.is_none() || s.district_id == filter.district_id)
        .collect();

    let submitted = match (&selected_form, &selected_period) {
        (Some(form), Some(period)) if !schools.is_empty() => {
            completed_school_ids(pool, form.id, period.id).await?
        }
        _ => HashSet::new(),
    };

    let mut by_district: BTreeMap<String, DistrictGap> = BTreeMap::new();
    for school in &schools {
        let district = school
            .district_id
            .and_then(|id| directory.districts.get(&id))
            .cloned();
        let district_name = district.as_ref().map(|d| d.name.clone()).unwrap_or_default();
        let key = format!("{}\u{0}{}", district_name, school.district_id.unwrap_or_default());
        let row = by_district.entry(key).or_insert_with(|| DistrictGap {
            district,
            district_name,
            total_schools: 0,
            submitted_count: 0,
            missing_count: 0,
            missing_schools: Vec::new(),
        });
        row.total_schools += 1;
        if submitted.contains(&school.id) {
            row.submitted_count += 1;
        } else {
            row.missing_count += 1;
            row.missing_schools.push(MissingSchool::new(school, &directory));
        }
    }

    let district_rows: Vec<DistrictGap> = by_district.into_values().collect();
    let total_schools: usize = district_rows.iter().map(|r| r.total_schools).sum();
    let total_submitted: usize = district_rows.iter().map(|r| r.submitted_count).sum();
    debug!(
        "Submission gaps for {}: {} of {} submitted",
        actor.username, total_submitted, total_schools
    );

    Ok(SubmissionGaps {
        sections,
        selected_section: section,
        form_templates,
        selected_form,
        periods,
        selected_period,
        districts,
        selected_district_id: filter.district_id,
        district_rows,
        total_schools,
        total_submitted,
        total_missing: total_schools - total_submitted,
    })
}
