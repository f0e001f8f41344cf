//! Form template scheduling and the list of forms a school can open.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::accounts::{guards, Actor};
use crate::dashboards::cache::DashboardCache;
use crate::database::models::{FormTemplate, Period, Section, Submission};
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};

pub const PERIOD_TYPES: [&str; 3] = ["month", "quarter", "semester"];
pub const DEFAULT_EXTEND_DAYS: i64 = 7;
pub const MAX_EXTEND_DAYS: i64 = 366;

/// Reading assessment timing enforced for a template and period: the
/// template override when set, otherwise derived from the quarter.
pub fn reading_timing(template: &FormTemplate, period: &Period) -> &'static str {
    match template.reading_timing_override.trim().to_ascii_lowercase().as_str() {
        "bosy" => return "bosy",
        "mosy" => return "mosy",
        "eosy" => return "eosy",
        _ => {}
    }
    match period.quarter_tag.trim().to_ascii_uppercase().as_str() {
        "Q1" => "eosy",
        "Q2" | "Q3" => "bosy",
        "Q4" => "mosy",
        _ => "bosy",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub section_code: String,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_period_type")]
    pub period_type: String,
    pub open_at: NaiveDate,
    pub close_at: NaiveDate,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub school_year: Option<i64>,
    #[serde(default)]
    pub quarter_filter: String,
    #[serde(default)]
    pub reading_timing_override: String,
}

fn default_period_type() -> String {
    "quarter".to_string()
}

fn default_active() -> bool {
    true
}

impl NewTemplate {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.code.trim().is_empty() {
            errors.push("Template code is required.".to_string());
        }
        if self.title.trim().is_empty() {
            errors.push("Template title is required.".to_string());
        }
        if !PERIOD_TYPES.contains(&self.period_type.as_str()) {
            errors.push(format!("Unknown period type '{}'.", self.period_type));
        }
        if !matches!(self.reading_timing_override.as_str(), "" | "bosy" | "mosy" | "eosy") {
            errors.push(format!(
                "Unknown reading timing '{}'.",
                self.reading_timing_override
            ));
        }
        if let Err(e) = check_schedule(self.open_at, self.close_at) {
            errors.push(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReportsError::Validation(errors))
        }
    }
}

fn check_schedule(open_at: NaiveDate, close_at: NaiveDate) -> std::result::Result<(), String> {
    if open_at > close_at {
        Err("Open date must be on or before the close date.".to_string())
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleUpdate {
    pub open_at: NaiveDate,
    pub close_at: NaiveDate,
    pub is_active: bool,
}

/// Template administration for section admins and SGOD.
#[derive(Clone)]
pub struct TemplateManager {
    pool: SqlitePool,
    cache: DashboardCache,
}

impl TemplateManager {
    pub fn new(pool: SqlitePool, cache: DashboardCache) -> Self {
        Self { pool, cache }
    }

    async fn managed_template(&self, actor: &Actor, template_id: i64) -> Result<FormTemplate> {
        let template = Queries::get_form_template(&self.pool, template_id).await?;
        let section = Queries::get_section(&self.pool, template.section_id).await?;
        guards::require_section_admin(actor, Some(&section.code))?;
        Ok(template)
    }

    pub async fn create(&self, actor: &Actor, input: NewTemplate) -> Result<FormTemplate> {
        let section = Queries::get_section_by_code(&self.pool, &input.section_code).await?;
        guards::require_section_admin(actor, Some(&section.code))?;
        input.validate()?;

        let template = sqlx::query_as::<_, FormTemplate>(
            r#"
            INSERT INTO form_templates
                (section_id, code, title, version, period_type, open_at, close_at, is_active,
                 school_year, quarter_filter, reading_timing_override)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(section.id)
        .bind(input.code.trim())
        .bind(input.title.trim())
        .bind(&input.version)
        .bind(&input.period_type)
        .bind(input.open_at)
        .bind(input.close_at)
        .bind(input.is_active)
        .bind(input.school_year)
        .bind(&input.quarter_filter)
        .bind(&input.reading_timing_override)
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Created form template {} in section {} by {}",
            template.code, section.code, actor.username
        );
        Ok(template)
    }

    pub async fn update_schedule(
        &self,
        actor: &Actor,
        template_id: i64,
        update: ScheduleUpdate,
    ) -> Result<FormTemplate> {
        let template = self.managed_template(actor, template_id).await?;
        check_schedule(update.open_at, update.close_at).map_err(ReportsError::validation)?;
        self.store_schedule(&template, update.open_at, update.close_at, update.is_active)
            .await
    }

    /// Close today; a future open date is pulled back to today.
    pub async fn close_today(
        &self,
        actor: &Actor,
        template_id: i64,
        today: NaiveDate,
    ) -> Result<FormTemplate> {
        let template = self.managed_template(actor, template_id).await?;
        let open_at = template.open_at.min(today);
        self.store_schedule(&template, open_at, today, template.is_active)
            .await
    }

    pub async fn open_today(
        &self,
        actor: &Actor,
        template_id: i64,
        today: NaiveDate,
    ) -> Result<FormTemplate> {
        let template = self.managed_template(actor, template_id).await?;
        let close_at = template.close_at.max(today);
        self.store_schedule(&template, today, close_at, true).await
    }

    /// Push the close date `days` past the later of today and the current
    /// close date, and activate.
    pub async fn extend_close(
        &self,
        actor: &Actor,
        template_id: i64,
        days: Option<i64>,
        today: NaiveDate,
    ) -> Result<FormTemplate> {
        let template = self.managed_template(actor, template_id).await?;
        let days = days.unwrap_or(DEFAULT_EXTEND_DAYS);
        if !(0..=MAX_EXTEND_DAYS).contains(&days) {
            return Err(ReportsError::validation(format!(
                "Days must be between 0 and {}.",
                MAX_EXTEND_DAYS
            )));
        }
        let close_at = template
            .close_at
            .max(today)
            .checked_add_days(Days::new(days as u64))
            .ok_or_else(|| ReportsError::validation("Extended close date is out of range."))?;
        let open_at = template.open_at.min(close_at);
        self.store_schedule(&template, open_at, close_at, true).await
    }

    async fn store_schedule(
        &self,
        template: &FormTemplate,
        open_at: NaiveDate,
        close_at: NaiveDate,
        is_active: bool,
    ) -> Result<FormTemplate> {
        let updated = sqlx::query_as::<_, FormTemplate>(
            r#"
            UPDATE form_templates SET open_at = ?, close_at = ?, is_active = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(open_at)
        .bind(close_at)
        .bind(is_active)
        .bind(template.id)
        .fetch_one(&self.pool)
        .await?;
        info!(
            "Template {} scheduled {} .. {} (active: {})",
            updated.code, updated.open_at, updated.close_at, updated.is_active
        );
        Ok(updated)
    }

    /// Delete a template with all of its submissions. Returns how many
    /// submissions went with it.
    pub async fn delete(&self, actor: &Actor, template_id: i64) -> Result<u64> {
        let template = self.managed_template(actor, template_id).await?;

        let mut tx = self.pool.begin().await?;
        let school_ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT school_id FROM submissions WHERE form_template_id = ?",
        )
        .bind(template.id)
        .fetch_all(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM submissions WHERE form_template_id = ?")
            .bind(template.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM form_templates WHERE id = ?")
            .bind(template.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        for school_id in school_ids {
            self.cache.invalidate_school(school_id).await;
        }
        info!(
            "Deleted template {} and {} submission(s) by {}",
            template.code, deleted, actor.username
        );
        Ok(deleted)
    }

    /// Templates in the actor's sections, optionally narrowed to one section.
    pub async fn list_manageable(
        &self,
        actor: &Actor,
        section_code: Option<&str>,
    ) -> Result<Vec<FormTemplate>> {
        guards::require_section_admin(actor, section_code)?;
        let sections: Vec<Section> = Queries::list_sections(&self.pool)
            .await?
            .into_iter()
            .filter(|s| actor.is_section_admin(Some(&s.code)))
            .filter(|s| match section_code {
                Some(code) => s.code.eq_ignore_ascii_case(code.trim()),
                None => true,
            })
            .collect();

        let mut templates = Vec::new();
        for section in &sections {
            templates.extend(Queries::list_form_templates_for_section(&self.pool, section.id).await?);
        }
        templates.sort_by(|a, b| {
            b.open_at
                .cmp(&a.open_at)
                .then(b.close_at.cmp(&a.close_at))
                .then(a.title.cmp(&b.title))
        });
        Ok(templates)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenForm {
    pub template: FormTemplate,
    pub submission: Option<Submission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenForms {
    pub section: Section,
    pub period: Option<Period>,
    pub forms: Vec<OpenForm>,
    pub can_start: bool,
}

/// Forms of a section open on `today`, with the actor school's existing
/// submission for the latest period.
pub async fn open_forms(
    pool: &SqlitePool,
    actor: &Actor,
    section_code: &str,
    today: NaiveDate,
) -> Result<OpenForms> {
    let section = Queries::get_section_by_code(pool, section_code).await?;
    if actor.school_id.is_none() && !actor.is_section_admin(Some(&section.code)) {
        return Err(ReportsError::forbidden(format!(
            "You do not have access to the {} forms.",
            section.name
        )));
    }

    let mut templates: Vec<FormTemplate> = Queries::list_form_templates_for_section(pool, section.id)
        .await?
        .into_iter()
        .filter(|t| t.is_open_on(today))
        .collect();
    templates.sort_by(|a, b| a.title.cmp(&b.title));

    let period = Queries::latest_period(pool).await?;
    let mut forms = Vec::with_capacity(templates.len());
    for template in templates {
        let submission = match (actor.school_id, &period) {
            (Some(school_id), Some(period)) => {
                Queries::find_submission(pool, school_id, template.id, period.id).await?
            }
            _ => None,
        };
        forms.push(OpenForm {
            template,
            submission,
        });
    }

    let can_start = actor.school_id.is_some() && period.is_some() && actor.is_school_head();
    Ok(OpenForms {
        section,
        period,
        forms,
        can_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(override_timing: &str) -> FormTemplate {
        FormTemplate {
            id: 1,
            section_id: 1,
            code: "smea-q".to_string(),
            title: "SMEA".to_string(),
            version: String::new(),
            period_type: "quarter".to_string(),
            open_at: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            close_at: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            is_active: true,
            school_year: None,
            quarter_filter: String::new(),
            reading_timing_override: override_timing.to_string(),
        }
    }

    fn period(tag: &str) -> Period {
        Period {
            id: 1,
            label: format!("{} SY 2025-2026", tag),
            school_year_start: 2025,
            quarter_tag: tag.to_string(),
            display_order: 1,
            is_active: true,
        }
    }

    #[test]
    fn test_reading_timing_from_quarter() {
        let t = template("");
        assert_eq!(reading_timing(&t, &period("Q1")), "eosy");
        assert_eq!(reading_timing(&t, &period("Q2")), "bosy");
        assert_eq!(reading_timing(&t, &period("Q3")), "bosy");
        assert_eq!(reading_timing(&t, &period("Q4")), "mosy");
        assert_eq!(reading_timing(&t, &period("")), "bosy");
    }

    #[test]
    fn test_reading_timing_override_wins() {
        assert_eq!(reading_timing(&template("mosy"), &period("Q1")), "mosy");
        assert_eq!(reading_timing(&template("later"), &period("Q4")), "mosy");
    }

    #[test]
    fn test_new_template_validation() {
        let input = NewTemplate {
            section_code: "smme".to_string(),
            code: " ".to_string(),
            title: "SMEA".to_string(),
            version: String::new(),
            period_type: "weekly".to_string(),
            open_at: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            close_at: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            is_active: true,
            school_year: None,
            quarter_filter: String::new(),
            reading_timing_override: String::new(),
        };
        match input.validate() {
            Err(ReportsError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
