//! Per-section form rows: validation, atomic replacement and row seeding.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::catalog;
use super::plans::{self, InterventionList, PlanRows, PlanValidator};
use super::templates::reading_timing;
use crate::accounts::{guards, Actor};
use crate::database::models::*;
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};

/// Editable sections of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormSection {
    Pct,
    Slp,
    SlpAnalysis,
    SlpLlc,
    SlpTop,
    Crla,
    Philiri,
    ReadingInterventions,
    ReadingDifficulties,
    Rma,
    RmaInterventions,
    Supervision,
    Adm,
    Signatories,
}

impl FormSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormSection::Pct => "pct",
            FormSection::Slp => "slp",
            FormSection::SlpAnalysis => "slp_analysis",
            FormSection::SlpLlc => "slp_llc",
            FormSection::SlpTop => "slp_top",
            FormSection::Crla => "crla",
            FormSection::Philiri => "philiri",
            FormSection::ReadingInterventions => "reading_interventions",
            FormSection::ReadingDifficulties => "reading_difficulties",
            FormSection::Rma => "rma",
            FormSection::RmaInterventions => "rma_interventions",
            FormSection::Supervision => "supervision",
            FormSection::Adm => "adm",
            FormSection::Signatories => "signatories",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pct" => Some(FormSection::Pct),
            "slp" => Some(FormSection::Slp),
            "slp_analysis" => Some(FormSection::SlpAnalysis),
            "slp_llc" => Some(FormSection::SlpLlc),
            "slp_top" => Some(FormSection::SlpTop),
            "crla" => Some(FormSection::Crla),
            "philiri" => Some(FormSection::Philiri),
            "reading_interventions" => Some(FormSection::ReadingInterventions),
            "reading_difficulties" => Some(FormSection::ReadingDifficulties),
            "rma" => Some(FormSection::Rma),
            "rma_interventions" => Some(FormSection::RmaInterventions),
            "supervision" => Some(FormSection::Supervision),
            "adm" => Some(FormSection::Adm),
            "signatories" => Some(FormSection::Signatories),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PctInput {
    pub area: String,
    pub percent: Option<i64>,
    #[serde(default)]
    pub action_points: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlpInput {
    pub grade_label: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub enrolment: i64,
    #[serde(default)]
    pub dnme: i64,
    #[serde(default)]
    pub fs: i64,
    #[serde(default)]
    pub s: i64,
    #[serde(default)]
    pub vs: i64,
    #[serde(default)]
    pub o: i64,
    #[serde(default = "default_true")]
    pub is_offered: bool,
    #[serde(default)]
    pub top_three_llc: String,
    #[serde(default)]
    pub non_mastery_reasons: Vec<String>,
    #[serde(default)]
    pub non_mastery_other: String,
    #[serde(default)]
    pub intervention_plan: String,
}

impl SlpInput {
    fn counts(&self) -> [i64; 5] {
        [self.dnme, self.fs, self.s, self.vs, self.o]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrlaInput {
    #[serde(default)]
    pub period: Option<String>,
    pub level: String,
    #[serde(default)]
    pub mt_grade_1: i64,
    #[serde(default)]
    pub mt_grade_2: i64,
    #[serde(default)]
    pub mt_grade_3: i64,
    #[serde(default)]
    pub fil_grade_2: i64,
    #[serde(default)]
    pub fil_grade_3: i64,
    #[serde(default)]
    pub eng_grade_3: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhiliriInput {
    #[serde(default)]
    pub period: Option<String>,
    pub level: String,
    #[serde(default)]
    pub eng: [i64; 7],
    #[serde(default)]
    pub fil: [i64; 7],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RmaInput {
    pub grade_label: String,
    #[serde(default)]
    pub enrolment: i64,
    #[serde(default)]
    pub emerging_not_proficient: i64,
    #[serde(default)]
    pub emerging_low_proficient: i64,
    #[serde(default)]
    pub developing_nearly_proficient: i64,
    #[serde(default)]
    pub transitioning_proficient: i64,
    #[serde(default)]
    pub at_grade_level: i64,
}

impl RmaInput {
    fn bands(&self) -> [i64; 5] {
        [
            self.emerging_not_proficient,
            self.emerging_low_proficient,
            self.developing_nearly_proficient,
            self.transitioning_proficient,
            self.at_grade_level,
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisionInput {
    #[serde(default)]
    pub grade_label: String,
    #[serde(default)]
    pub total_teachers: i64,
    #[serde(default)]
    pub teachers_supervised_observed_ta: i64,
    #[serde(default)]
    pub intervention_support_provided: String,
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdmRowInput {
    #[serde(default)]
    pub ppas_conducted: String,
    #[serde(default)]
    pub ppas_physical_target: i64,
    #[serde(default)]
    pub ppas_physical_actual: i64,
    #[serde(default)]
    pub ppas_physical_percent: f64,
    #[serde(default)]
    pub funds_downloaded: f64,
    #[serde(default)]
    pub funds_obligated: f64,
    #[serde(default)]
    pub funds_unobligated: f64,
    #[serde(default)]
    pub funds_percent_obligated: f64,
    #[serde(default)]
    pub funds_percent_burn_rate: f64,
    #[serde(default)]
    pub q1_response: String,
    #[serde(default)]
    pub q2_response: String,
    #[serde(default)]
    pub q3_response: String,
    #[serde(default)]
    pub q4_response: String,
    #[serde(default)]
    pub q5_response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmInput {
    #[serde(default = "default_true")]
    pub is_offered: bool,
    #[serde(default)]
    pub rows: Vec<AdmRowInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    #[serde(default)]
    pub project_title: String,
    #[serde(default)]
    pub area_of_concern: String,
    #[serde(default)]
    pub conference_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    pub activity: String,
    #[serde(default)]
    pub output_target: String,
    #[serde(default)]
    pub output_actual: String,
    #[serde(default)]
    pub timeframe_target: String,
    #[serde(default)]
    pub timeframe_actual: String,
    #[serde(default)]
    pub budget_target: String,
    #[serde(default)]
    pub budget_actual: String,
    #[serde(default)]
    pub interpretation: String,
    #[serde(default)]
    pub issues_unaddressed: String,
    #[serde(default)]
    pub facilitating_factors: String,
    #[serde(default)]
    pub agreements: String,
}

/// Row-level checks. Each returns every problem found, not just the first.
pub struct FormValidator;

impl FormValidator {
    pub fn validate_pct(rows: &[PctInput]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            if !catalog::PCT_AREAS.contains(&row.area.as_str()) {
                errors.push(format!("Unknown implementation area '{}'.", row.area));
            }
            if !seen.insert(row.area.as_str()) {
                errors.push(format!("Area '{}' appears more than once.", row.area));
            }
            if let Some(percent) = row.percent {
                if !(0..=100).contains(&percent) {
                    errors.push(format!("{}: Percent must be between 0 and 100.", row.area));
                }
            }
        }
        into_result(errors)
    }

    /// Not-offered rows have their counts zeroed before validation.
    pub fn validate_slp(rows: &mut [SlpInput]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for row in rows.iter_mut() {
            if row.subject.trim().is_empty() {
                row.subject = catalog::SLP_DEFAULT_SUBJECT.to_string();
            }
            if !seen.insert((row.grade_label.clone(), row.subject.clone())) {
                errors.push(format!(
                    "{} ({}) appears more than once.",
                    row.grade_label, row.subject
                ));
            }
            if !row.is_offered {
                row.enrolment = 0;
                row.dnme = 0;
                row.fs = 0;
                row.s = 0;
                row.vs = 0;
                row.o = 0;
                continue;
            }
            if row.enrolment < 0 || row.counts().iter().any(|c| *c < 0) {
                errors.push(format!(
                    "Counts for {} ({}) cannot be negative.",
                    row.grade_label, row.subject
                ));
            }
            match checked_total(&row.counts()) {
                Some(total) if total > row.enrolment => errors.push(format!(
                    "Totals for {} ({}) cannot exceed enrolment.",
                    row.grade_label, row.subject
                )),
                Some(_) => {}
                None => errors.push(format!(
                    "Totals for {} ({}) are too large.",
                    row.grade_label, row.subject
                )),
            }
            for code in &row.non_mastery_reasons {
                if !catalog::NON_MASTERY_REASONS.iter().any(|(c, _)| c == code) {
                    errors.push(format!("Unknown non-mastery reason '{}'.", code));
                }
            }
            if row.non_mastery_reasons.iter().any(|c| c == "f")
                && row.non_mastery_other.trim().is_empty()
            {
                errors.push(format!(
                    "Describe the other reason for {} ({}).",
                    row.grade_label, row.subject
                ));
            }
        }
        into_result(errors)
    }

    /// Any client-sent period is ignored; rows are stored under the enforced timing.
    pub fn validate_crla(rows: &[CrlaInput]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            if !catalog::CRLA_LEVELS.contains(&row.level.as_str()) {
                errors.push(format!("Unknown CRLA level '{}'.", row.level));
            }
            if !seen.insert(row.level.as_str()) {
                errors.push(format!("CRLA level '{}' appears more than once.", row.level));
            }
            let counts = [
                row.mt_grade_1,
                row.mt_grade_2,
                row.mt_grade_3,
                row.fil_grade_2,
                row.fil_grade_3,
                row.eng_grade_3,
            ];
            if counts.iter().any(|c| *c < 0) {
                errors.push(format!("CRLA counts for '{}' cannot be negative.", row.level));
            }
        }
        into_result(errors)
    }

    pub fn validate_philiri(rows: &[PhiliriInput]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            if !catalog::PHILIRI_LEVELS.contains(&row.level.as_str()) {
                errors.push(format!("Unknown PHILIRI level '{}'.", row.level));
            }
            if !seen.insert(row.level.as_str()) {
                errors.push(format!("PHILIRI level '{}' appears more than once.", row.level));
            }
            if row.eng.iter().chain(row.fil.iter()).any(|c| *c < 0) {
                errors.push(format!("PHILIRI counts for '{}' cannot be negative.", row.level));
            }
        }
        into_result(errors)
    }

    pub fn validate_rma(rows: &[RmaInput]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            if !catalog::is_rma_grade_label(&row.grade_label) {
                errors.push(format!("Unknown RMA grade '{}'.", row.grade_label));
            }
            if !seen.insert(row.grade_label.as_str()) {
                errors.push(format!("RMA grade '{}' appears more than once.", row.grade_label));
            }
            if row.enrolment < 0 || row.bands().iter().any(|c| *c < 0) {
                errors.push(format!("RMA counts for {} cannot be negative.", row.grade_label));
            }
            match checked_total(&row.bands()) {
                Some(total) if total > row.enrolment => errors.push(format!(
                    "RMA proficiency totals for {} cannot exceed enrolment.",
                    row.grade_label
                )),
                Some(_) => {}
                None => errors.push(format!(
                    "RMA proficiency totals for {} are too large.",
                    row.grade_label
                )),
            }
        }
        into_result(errors)
    }

    pub fn validate_supervision(rows: &[SupervisionInput]) -> Result<()> {
        let mut errors = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if row.total_teachers < 0 || row.teachers_supervised_observed_ta < 0 {
                errors.push(format!("Row {}: counts cannot be negative.", index + 1));
            }
            if row.teachers_supervised_observed_ta > row.total_teachers {
                errors.push(format!(
                    "Row {}: Cannot exceed total number of teachers.",
                    index + 1
                ));
            }
        }
        into_result(errors)
    }

    /// Not-offered ADM drops every row.
    pub fn validate_adm(input: &mut AdmInput) -> Result<()> {
        if !input.is_offered {
            input.rows.clear();
            return Ok(());
        }
        let mut errors = Vec::new();
        for (index, row) in input.rows.iter().enumerate() {
            let n = index + 1;
            for (value, label) in [
                (row.ppas_physical_percent, "Physical %"),
                (row.funds_percent_obligated, "% obligated"),
                (row.funds_percent_burn_rate, "Burn rate %"),
            ] {
                if !(0.0..=100.0).contains(&value) {
                    errors.push(format!("Row {}: {} must be between 0 and 100.", n, label));
                }
            }
            if row.ppas_physical_target < 0
                || row.ppas_physical_actual < 0
                || row.funds_downloaded < 0.0
                || row.funds_obligated < 0.0
                || row.funds_unobligated < 0.0
            {
                errors.push(format!("Row {}: Value cannot be negative.", n));
            }
            if row.ppas_physical_actual > row.ppas_physical_target {
                errors.push(format!("Row {}: Physical actual cannot exceed the target.", n));
            }
            if row.funds_obligated > row.funds_downloaded {
                errors.push(format!(
                    "Row {}: Funds obligated cannot exceed funds downloaded.",
                    n
                ));
            }
            if row.funds_unobligated > row.funds_downloaded {
                errors.push(format!(
                    "Row {}: Funds unobligated cannot exceed funds downloaded.",
                    n
                ));
            }
        }
        into_result(errors)
    }
}

/// Sum of the counts, or `None` when it does not fit in an `i64`.
pub(crate) fn checked_total(counts: &[i64]) -> Option<i64> {
    counts.iter().try_fold(0i64, |total, count| total.checked_add(*count))
}

pub(crate) fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ReportsError::Validation(errors))
    }
}

pub(crate) fn parse_payload<T: serde::de::DeserializeOwned>(section: FormSection, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| {
        ReportsError::validation(format!("Invalid {} payload: {}", section.as_str(), e))
    })
}

/// Every form row attached to one submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRows {
    pub projects: Vec<ProjectWithActivities>,
    pub pct: Vec<PctRow>,
    pub slp: Vec<SlpRow>,
    pub crla: Vec<CrlaRow>,
    pub philiri: Vec<PhiliriRow>,
    pub rma: Vec<RmaRow>,
    pub supervision: Vec<SupervisionRow>,
    pub adm_header: Option<AdmHeader>,
    pub adm: Vec<AdmRow>,
    #[serde(flatten)]
    pub plans: PlanRows,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectWithActivities {
    #[serde(flatten)]
    pub project: SmeaProject,
    pub activities: Vec<SmeaActivity>,
}

/// School-side editing of submission rows.
#[derive(Clone)]
pub struct SubmissionForms {
    pool: SqlitePool,
}

impl SubmissionForms {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// School head of the submission's school, and only while editable.
    pub async fn require_editable(&self, actor: &Actor, submission_id: i64) -> Result<Submission> {
        let submission = Queries::get_submission(&self.pool, submission_id).await?;
        guards::require_school_head(actor, Some(submission.school_id))?;
        if !submission.is_editable_by_school() {
            return Err(ReportsError::forbidden("Submission is read-only."));
        }
        Ok(submission)
    }

    pub async fn save_section(
        &self,
        actor: &Actor,
        submission_id: i64,
        section: FormSection,
        payload: Value,
    ) -> Result<()> {
        let submission = self.require_editable(actor, submission_id).await?;
        match section {
            FormSection::Pct => {
                let rows: Vec<PctInput> = parse_payload(section, payload)?;
                FormValidator::validate_pct(&rows)?;
                self.replace_pct(submission.id, &rows).await?;
            }
            FormSection::Slp => {
                let mut rows: Vec<SlpInput> = parse_payload(section, payload)?;
                FormValidator::validate_slp(&mut rows)?;
                self.replace_slp(submission.id, &rows).await?;
            }
            FormSection::Crla => {
                let rows: Vec<CrlaInput> = parse_payload(section, payload)?;
                let timing = self.reading_timing_for(&submission).await?;
                FormValidator::validate_crla(&rows)?;
                self.replace_crla(submission.id, timing, &rows).await?;
            }
            FormSection::Philiri => {
                let rows: Vec<PhiliriInput> = parse_payload(section, payload)?;
                let timing = self.reading_timing_for(&submission).await?;
                FormValidator::validate_philiri(&rows)?;
                self.replace_philiri(submission.id, timing, &rows).await?;
            }
            FormSection::Rma => {
                let rows: Vec<RmaInput> = parse_payload(section, payload)?;
                FormValidator::validate_rma(&rows)?;
                self.replace_rma(submission.id, &rows).await?;
            }
            FormSection::Supervision => {
                let rows: Vec<SupervisionInput> = parse_payload(section, payload)?;
                FormValidator::validate_supervision(&rows)?;
                self.replace_supervision(submission.id, &rows).await?;
            }
            FormSection::Adm => {
                let mut input: AdmInput = parse_payload(section, payload)?;
                FormValidator::validate_adm(&mut input)?;
                self.replace_adm(submission.id, &input).await?;
            }
            FormSection::SlpAnalysis => {
                let mut rows: Vec<plans::SlpAnalysisInput> = parse_payload(section, payload)?;
                let known = plans::slp_row_keys(&self.pool, submission.id).await?;
                PlanValidator::validate_slp_analysis(&mut rows, &known)?;
                plans::replace_slp_analysis(&self.pool, submission.id, &rows).await?;
            }
            FormSection::SlpLlc => {
                let rows: Vec<plans::LlcInput> = parse_payload(section, payload)?;
                PlanValidator::validate_llc(&rows)?;
                plans::replace_llc(&self.pool, submission.id, &rows).await?;
            }
            FormSection::SlpTop => {
                let mut input: plans::TopListsInput = parse_payload(section, payload)?;
                PlanValidator::validate_top_lists(&mut input)?;
                plans::replace_top_lists(&self.pool, submission.id, &input).await?;
            }
            FormSection::ReadingInterventions | FormSection::RmaInterventions => {
                let list = if section == FormSection::ReadingInterventions {
                    InterventionList::Reading
                } else {
                    InterventionList::Rma
                };
                let rows: Vec<plans::InterventionInput> = parse_payload(section, payload)?;
                PlanValidator::validate_interventions(list.label(), &rows)?;
                plans::replace_interventions(&self.pool, submission.id, list, &rows).await?;
            }
            FormSection::ReadingDifficulties => {
                let mut rows: Vec<plans::DifficultyPlanInput> = parse_payload(section, payload)?;
                PlanValidator::validate_difficulty_plans(&mut rows)?;
                let timing = self.reading_timing_for(&submission).await?;
                plans::replace_difficulty_plans(&self.pool, submission.id, timing, &rows).await?;
            }
            FormSection::Signatories => {
                let mut input: plans::SignatoriesInput = parse_payload(section, payload)?;
                PlanValidator::validate_signatories(&mut input)?;
                plans::save_signatories(&self.pool, submission.id, &input).await?;
            }
        }
        touch(&self.pool, submission.id, actor.user_id).await?;
        info!(
            "Saved {} rows for submission {} by {}",
            section.as_str(),
            submission.id,
            actor.username
        );
        Ok(())
    }

    async fn reading_timing_for(&self, submission: &Submission) -> Result<&'static str> {
        let template = Queries::get_form_template(&self.pool, submission.form_template_id).await?;
        let period = Queries::get_period(&self.pool, submission.period_id).await?;
        Ok(reading_timing(&template, &period))
    }

    async fn replace_pct(&self, submission_id: i64, rows: &[PctInput]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM pct_rows WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO pct_rows (submission_id, area, percent, action_points) VALUES (?, ?, ?, ?)",
            )
            .bind(submission_id)
            .bind(&row.area)
            .bind(row.percent)
            .bind(&row.action_points)
            .execute(&mut *tx)
            .await?;
        }
        ensure_pct_rows(&mut tx, submission_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_slp(&self, submission_id: i64, rows: &[SlpInput]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM slp_rows WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO slp_rows
                    (submission_id, grade_label, subject, enrolment, dnme, fs, s, vs, o, is_offered,
                     top_three_llc, non_mastery_reasons, non_mastery_other, intervention_plan)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(&row.grade_label)
            .bind(&row.subject)
            .bind(row.enrolment)
            .bind(row.dnme)
            .bind(row.fs)
            .bind(row.s)
            .bind(row.vs)
            .bind(row.o)
            .bind(row.is_offered)
            .bind(&row.top_three_llc)
            .bind(row.non_mastery_reasons.join(","))
            .bind(&row.non_mastery_other)
            .bind(&row.intervention_plan)
            .execute(&mut *tx)
            .await?;
        }
        plans::prune_slp_analyses(&mut tx, submission_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_crla(&self, submission_id: i64, timing: &str, rows: &[CrlaInput]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM crla_rows WHERE submission_id = ? AND period = ?")
            .bind(submission_id)
            .bind(timing)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO crla_rows
                    (submission_id, period, level, mt_grade_1, mt_grade_2, mt_grade_3,
                     fil_grade_2, fil_grade_3, eng_grade_3)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(timing)
            .bind(&row.level)
            .bind(row.mt_grade_1)
            .bind(row.mt_grade_2)
            .bind(row.mt_grade_3)
            .bind(row.fil_grade_2)
            .bind(row.fil_grade_3)
            .bind(row.eng_grade_3)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_philiri(
        &self,
        submission_id: i64,
        timing: &str,
        rows: &[PhiliriInput],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM philiri_rows WHERE submission_id = ? AND period = ?")
            .bind(submission_id)
            .bind(timing)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            let [e4, e5, e6, e7, e8, e9, e10] = row.eng;
            let [f4, f5, f6, f7, f8, f9, f10] = row.fil;
            sqlx::query(
                r#"
                INSERT INTO philiri_rows
                    (submission_id, period, level,
                     eng_grade_4, eng_grade_5, eng_grade_6, eng_grade_7, eng_grade_8, eng_grade_9, eng_grade_10,
                     fil_grade_4, fil_grade_5, fil_grade_6, fil_grade_7, fil_grade_8, fil_grade_9, fil_grade_10)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(timing)
            .bind(&row.level)
            .bind(e4)
            .bind(e5)
            .bind(e6)
            .bind(e7)
            .bind(e8)
            .bind(e9)
            .bind(e10)
            .bind(f4)
            .bind(f5)
            .bind(f6)
            .bind(f7)
            .bind(f8)
            .bind(f9)
            .bind(f10)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_rma(&self, submission_id: i64, rows: &[RmaInput]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM rma_rows WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO rma_rows
                    (submission_id, grade_label, enrolment, emerging_not_proficient,
                     emerging_low_proficient, developing_nearly_proficient,
                     transitioning_proficient, at_grade_level)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(&row.grade_label)
            .bind(row.enrolment)
            .bind(row.emerging_not_proficient)
            .bind(row.emerging_low_proficient)
            .bind(row.developing_nearly_proficient)
            .bind(row.transitioning_proficient)
            .bind(row.at_grade_level)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_supervision(&self, submission_id: i64, rows: &[SupervisionInput]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM supervision_rows WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO supervision_rows
                    (submission_id, grade_label, total_teachers, teachers_supervised_observed_ta,
                     intervention_support_provided, result)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(&row.grade_label)
            .bind(row.total_teachers)
            .bind(row.teachers_supervised_observed_ta)
            .bind(&row.intervention_support_provided)
            .bind(&row.result)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn replace_adm(&self, submission_id: i64, input: &AdmInput) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO adm_headers (submission_id, is_offered) VALUES (?, ?)
            ON CONFLICT (submission_id) DO UPDATE SET is_offered = excluded.is_offered
            "#,
        )
        .bind(submission_id)
        .bind(input.is_offered)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM adm_rows WHERE submission_id = ?")
            .bind(submission_id)
            .execute(&mut *tx)
            .await?;
        for row in &input.rows {
            sqlx::query(
                r#"
                INSERT INTO adm_rows
                    (submission_id, ppas_conducted, ppas_physical_target, ppas_physical_actual,
                     ppas_physical_percent, funds_downloaded, funds_obligated, funds_unobligated,
                     funds_percent_obligated, funds_percent_burn_rate,
                     q1_response, q2_response, q3_response, q4_response, q5_response)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(&row.ppas_conducted)
            .bind(row.ppas_physical_target)
            .bind(row.ppas_physical_actual)
            .bind(row.ppas_physical_percent)
            .bind(row.funds_downloaded)
            .bind(row.funds_obligated)
            .bind(row.funds_unobligated)
            .bind(row.funds_percent_obligated)
            .bind(row.funds_percent_burn_rate)
            .bind(&row.q1_response)
            .bind(&row.q2_response)
            .bind(&row.q3_response)
            .bind(&row.q4_response)
            .bind(&row.q5_response)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_project(
        &self,
        actor: &Actor,
        submission_id: i64,
        project: NewProject,
    ) -> Result<SmeaProject> {
        let submission = self.require_editable(actor, submission_id).await?;
        let created = sqlx::query_as::<_, SmeaProject>(
            r#"
            INSERT INTO smea_projects (submission_id, project_title, area_of_concern, conference_date)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(submission.id)
        .bind(project.project_title.trim())
        .bind(project.area_of_concern.trim())
        .bind(project.conference_date)
        .fetch_one(&self.pool)
        .await?;
        touch(&self.pool, submission.id, actor.user_id).await?;
        debug!("Added project {} to submission {}", created.id, submission.id);
        Ok(created)
    }

    pub async fn add_activity(
        &self,
        actor: &Actor,
        project_id: i64,
        activity: NewActivity,
    ) -> Result<SmeaActivity> {
        let project = sqlx::query_as::<_, SmeaProject>("SELECT * FROM smea_projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReportsError::not_found(format!("project {}", project_id)))?;
        let submission = self.require_editable(actor, project.submission_id).await?;

        if activity.activity.trim().is_empty() {
            return Err(ReportsError::validation("Activity description is required."));
        }

        let created = sqlx::query_as::<_, SmeaActivity>(
            r#"
            INSERT INTO smea_activities
                (project_id, activity, output_target, output_actual, timeframe_target,
                 timeframe_actual, budget_target, budget_actual, interpretation,
                 issues_unaddressed, facilitating_factors, agreements, row_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    (SELECT COALESCE(MAX(row_order), 0) + 1 FROM smea_activities WHERE project_id = ?))
            RETURNING *
            "#,
        )
        .bind(project.id)
        .bind(activity.activity.trim())
        .bind(&activity.output_target)
        .bind(&activity.output_actual)
        .bind(&activity.timeframe_target)
        .bind(&activity.timeframe_actual)
        .bind(&activity.budget_target)
        .bind(&activity.budget_actual)
        .bind(&activity.interpretation)
        .bind(&activity.issues_unaddressed)
        .bind(&activity.facilitating_factors)
        .bind(&activity.agreements)
        .bind(project.id)
        .fetch_one(&self.pool)
        .await?;
        touch(&self.pool, submission.id, actor.user_id).await?;
        Ok(created)
    }
}

async fn touch(pool: &SqlitePool, submission_id: i64, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE submissions SET updated_at = ?, last_modified_by = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(user_id)
        .bind(submission_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Seed one PCT row per implementation area, leaving existing rows alone.
pub async fn ensure_pct_rows(conn: &mut SqliteConnection, submission_id: i64) -> Result<()> {
    for area in catalog::PCT_AREAS {
        sqlx::query(
            r#"
            INSERT INTO pct_rows (submission_id, area, percent, action_points)
            VALUES (?, ?, 0, '')
            ON CONFLICT (submission_id, area) DO NOTHING
            "#,
        )
        .bind(submission_id)
        .bind(area)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Make the SLP table match the given (grade, subject) pairs: missing pairs
/// are added empty, rows outside the list are removed.
pub async fn ensure_slp_rows(
    conn: &mut SqliteConnection,
    submission_id: i64,
    pairs: &[(String, String)],
) -> Result<()> {
    for (grade_label, subject) in pairs {
        sqlx::query(
            r#"
            INSERT INTO slp_rows (submission_id, grade_label, subject, is_offered)
            VALUES (?, ?, ?, 1)
            ON CONFLICT (submission_id, grade_label, subject) DO NOTHING
            "#,
        )
        .bind(submission_id)
        .bind(grade_label)
        .bind(subject)
        .execute(&mut *conn)
        .await?;
    }

    let existing = sqlx::query_as::<_, SlpRow>("SELECT * FROM slp_rows WHERE submission_id = ?")
        .bind(submission_id)
        .fetch_all(&mut *conn)
        .await?;
    for row in existing {
        let keep = pairs
            .iter()
            .any(|(g, s)| *g == row.grade_label && *s == row.subject);
        if !keep {
            sqlx::query("DELETE FROM slp_rows WHERE id = ?")
                .bind(row.id)
                .execute(&mut *conn)
                .await?;
        }
    }
    plans::prune_slp_analyses(conn, submission_id).await?;
    Ok(())
}

pub async fn load_rows(pool: &SqlitePool, submission_id: i64) -> Result<SubmissionRows> {
    let projects = sqlx::query_as::<_, SmeaProject>(
        "SELECT * FROM smea_projects WHERE submission_id = ? ORDER BY id",
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await?;
    let activities = sqlx::query_as::<_, SmeaActivity>(
        r#"
        SELECT a.* FROM smea_activities a
        JOIN smea_projects p ON p.id = a.project_id
        WHERE p.submission_id = ?
        ORDER BY a.project_id, a.row_order, a.id
        "#,
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await?;
    let projects = projects
        .into_iter()
        .map(|project| {
            let activities = activities
                .iter()
                .filter(|a| a.project_id == project.id)
                .cloned()
                .collect();
            ProjectWithActivities {
                project,
                activities,
            }
        })
        .collect();

    Ok(SubmissionRows {
        projects,
        pct: sqlx::query_as("SELECT * FROM pct_rows WHERE submission_id = ? ORDER BY id")
            .bind(submission_id)
            .fetch_all(pool)
            .await?,
        slp: sqlx::query_as("SELECT * FROM slp_rows WHERE submission_id = ? ORDER BY id")
            .bind(submission_id)
            .fetch_all(pool)
            .await?,
        crla: sqlx::query_as("SELECT * FROM crla_rows WHERE submission_id = ? ORDER BY period, id")
            .bind(submission_id)
            .fetch_all(pool)
            .await?,
        philiri: sqlx::query_as(
            "SELECT * FROM philiri_rows WHERE submission_id = ? ORDER BY period, id",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?,
        rma: sqlx::query_as("SELECT * FROM rma_rows WHERE submission_id = ? ORDER BY id")
            .bind(submission_id)
            .fetch_all(pool)
            .await?,
        supervision: sqlx::query_as(
            "SELECT * FROM supervision_rows WHERE submission_id = ? ORDER BY id",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?,
        adm_header: sqlx::query_as("SELECT * FROM adm_headers WHERE submission_id = ?")
            .bind(submission_id)
            .fetch_optional(pool)
            .await?,
        adm: sqlx::query_as("SELECT * FROM adm_rows WHERE submission_id = ? ORDER BY id")
            .bind(submission_id)
            .fetch_all(pool)
            .await?,
        plans: plans::load_plan_rows(pool, submission_id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slp(enrolment: i64, counts: [i64; 5]) -> SlpInput {
        SlpInput {
            grade_label: "Grade 4".to_string(),
            subject: "english".to_string(),
            enrolment,
            dnme: counts[0],
            fs: counts[1],
            s: counts[2],
            vs: counts[3],
            o: counts[4],
            is_offered: true,
            top_three_llc: String::new(),
            non_mastery_reasons: Vec::new(),
            non_mastery_other: String::new(),
            intervention_plan: String::new(),
        }
    }

    #[test]
    fn test_pct_percent_bounds() {
        let ok = vec![PctInput {
            area: "access".to_string(),
            percent: Some(100),
            action_points: String::new(),
        }];
        assert!(FormValidator::validate_pct(&ok).is_ok());

        let bad = vec![
            PctInput {
                area: "quality".to_string(),
                percent: Some(101),
                action_points: String::new(),
            },
            PctInput {
                area: "budget".to_string(),
                percent: None,
                action_points: String::new(),
            },
        ];
        match FormValidator::validate_pct(&bad) {
            Err(ReportsError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_slp_totals_cannot_exceed_enrolment() {
        let mut rows = vec![slp(10, [2, 2, 2, 2, 3])];
        assert!(FormValidator::validate_slp(&mut rows).is_err());

        let mut rows = vec![slp(10, [2, 2, 2, 2, 2])];
        assert!(FormValidator::validate_slp(&mut rows).is_ok());
    }

    #[test]
    fn test_slp_not_offered_zeroes_counts() {
        let mut row = slp(10, [20, 0, 0, 0, 0]);
        row.is_offered = false;
        let mut rows = vec![row];
        assert!(FormValidator::validate_slp(&mut rows).is_ok());
        assert_eq!(rows[0].enrolment, 0);
        assert_eq!(rows[0].dnme, 0);
    }

    #[test]
    fn test_slp_other_reason_needs_description() {
        let mut row = slp(10, [1, 0, 0, 0, 0]);
        row.non_mastery_reasons = vec!["a".to_string(), "f".to_string()];
        let mut rows = vec![row.clone()];
        assert!(FormValidator::validate_slp(&mut rows).is_err());

        row.non_mastery_other = "Learners transferred mid-quarter.".to_string();
        let mut rows = vec![row];
        assert!(FormValidator::validate_slp(&mut rows).is_ok());
    }

    #[test]
    fn test_slp_overflowing_counts_are_rejected() {
        let mut rows = vec![slp(10, [i64::MAX, 1, 0, 0, 0])];
        match FormValidator::validate_slp(&mut rows) {
            Err(ReportsError::Validation(errors)) => {
                assert_eq!(errors, vec!["Totals for Grade 4 (english) are too large.".to_string()])
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_client_reading_period_does_not_fail_validation() {
        let row = CrlaInput {
            period: Some("mosy".to_string()),
            level: "developing".to_string(),
            mt_grade_1: 1,
            mt_grade_2: 0,
            mt_grade_3: 0,
            fil_grade_2: 0,
            fil_grade_3: 0,
            eng_grade_3: 0,
        };
        assert!(FormValidator::validate_crla(&[row]).is_ok());

        let row = PhiliriInput {
            period: Some("eosy".to_string()),
            level: "frustration".to_string(),
            eng: [1, 0, 0, 0, 0, 0, 0],
            fil: [0; 7],
        };
        assert!(FormValidator::validate_philiri(&[row]).is_ok());
    }

    #[test]
    fn test_rma_bands_and_labels() {
        let row = RmaInput {
            grade_label: "g3".to_string(),
            enrolment: 5,
            emerging_not_proficient: 1,
            emerging_low_proficient: 1,
            developing_nearly_proficient: 1,
            transitioning_proficient: 1,
            at_grade_level: 2,
        };
        assert!(FormValidator::validate_rma(&[row.clone()]).is_err());

        let mut fixed = row.clone();
        fixed.at_grade_level = 1;
        assert!(FormValidator::validate_rma(&[fixed.clone()]).is_ok());

        fixed.grade_label = "Grade 3".to_string();
        assert!(FormValidator::validate_rma(&[fixed]).is_err());

        let mut huge = row;
        huge.emerging_not_proficient = i64::MAX;
        match FormValidator::validate_rma(&[huge]) {
            Err(ReportsError::Validation(errors)) => {
                assert_eq!(errors, vec!["RMA proficiency totals for g3 are too large.".to_string()])
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_adm_not_offered_clears_rows() {
        let mut input = AdmInput {
            is_offered: false,
            rows: vec![AdmRowInput {
                ppas_physical_percent: 150.0,
                ..Default::default()
            }],
        };
        assert!(FormValidator::validate_adm(&mut input).is_ok());
        assert!(input.rows.is_empty());
    }

    #[test]
    fn test_adm_funds_rules() {
        let mut input = AdmInput {
            is_offered: true,
            rows: vec![AdmRowInput {
                ppas_physical_target: 5,
                ppas_physical_actual: 6,
                funds_downloaded: 100.0,
                funds_obligated: 120.0,
                ..Default::default()
            }],
        };
        match FormValidator::validate_adm(&mut input) {
            Err(ReportsError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_supervision_cannot_exceed_total() {
        let rows = vec![SupervisionInput {
            grade_label: "Grade 1".to_string(),
            total_teachers: 3,
            teachers_supervised_observed_ta: 4,
            intervention_support_provided: String::new(),
            result: String::new(),
        }];
        assert!(FormValidator::validate_supervision(&rows).is_err());
    }

    #[test]
    fn test_section_names() {
        assert_eq!(FormSection::from_str("PHILIRI"), Some(FormSection::Philiri));
        assert_eq!(FormSection::from_str("projects"), None);
        for section in [
            FormSection::SlpAnalysis,
            FormSection::SlpTop,
            FormSection::ReadingDifficulties,
            FormSection::RmaInterventions,
            FormSection::Signatories,
        ] {
            assert_eq!(FormSection::from_str(section.as_str()), Some(section));
            assert_eq!(serde_json::to_value(section).unwrap(), section.as_str());
        }
    }
}
