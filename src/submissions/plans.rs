//! Planning sections that sit beside the count tables: SLP analysis and
//! least-learned competencies, top lists, intervention lists, reading
//! difficulty plans and the signatories block.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};

use super::catalog;
use super::forms::into_result;
use crate::database::models::*;
use crate::error::Result;

pub const LLC_POSITIONS: i64 = 3;
pub const TOP_POSITIONS: i64 = 5;
pub const INTERVENTION_POSITIONS: i64 = 5;
pub const MAX_DIFFICULTY_PAIRS: usize = 5;
pub const DIFFICULTY_TEXT_LIMIT: usize = 500;
pub const SIGNATORY_LIMIT: usize = 255;

pub const TOP_DNME: &str = "dnme";
pub const TOP_OUTSTANDING: &str = "outstanding";

#[derive(Debug, Clone, Deserialize)]
pub struct SlpAnalysisInput {
    pub grade_label: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub dnme_factors: String,
    #[serde(default)]
    pub fs_factors: String,
    #[serde(default)]
    pub s_practices: String,
    #[serde(default)]
    pub vs_practices: String,
    #[serde(default)]
    pub o_practices: String,
    #[serde(default)]
    pub overall_strategy: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlcInput {
    pub position: i64,
    #[serde(default)]
    pub llc_description: String,
    #[serde(default)]
    pub intervention: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopEntryInput {
    pub position: i64,
    #[serde(default)]
    pub grade_label: String,
    #[serde(default)]
    pub learner_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopListsInput {
    #[serde(default)]
    pub top_dnme: Vec<TopEntryInput>,
    #[serde(default)]
    pub top_outstanding: Vec<TopEntryInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterventionInput {
    pub position: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DifficultyPlanInput {
    pub grade_label: String,
    #[serde(default)]
    pub data: Vec<DifficultyPair>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatoriesInput {
    #[serde(default)]
    pub prepared_by: String,
    #[serde(default)]
    pub submitted_to: String,
}

/// Planning rows of one submission, flattened into [`super::forms::SubmissionRows`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanRows {
    pub slp_analysis: Vec<SlpAnalysis>,
    pub slp_llc: Vec<SlpLlcEntry>,
    pub slp_top_dnme: Vec<SlpTopEntry>,
    pub slp_top_outstanding: Vec<SlpTopEntry>,
    pub reading_interventions: Vec<InterventionRow>,
    pub reading_difficulties: Vec<ReadingDifficultyPlan>,
    pub rma_interventions: Vec<InterventionRow>,
    pub signatories: Option<Signatories>,
}

/// Checks for the planning sections. Like `FormValidator`, every problem is
/// reported at once.
pub struct PlanValidator;

impl PlanValidator {
    /// Each analysis must belong to an SLP row of the submission, given as
    /// (grade label, subject) pairs.
    pub fn validate_slp_analysis(rows: &mut [SlpAnalysisInput], slp_rows: &[(String, String)]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for row in rows.iter_mut() {
            if row.subject.trim().is_empty() {
                row.subject = catalog::SLP_DEFAULT_SUBJECT.to_string();
            }
            if !slp_rows
                .iter()
                .any(|(g, s)| *g == row.grade_label && *s == row.subject)
            {
                errors.push(format!(
                    "No SLP row for {} ({}) to analyse.",
                    row.grade_label, row.subject
                ));
            }
            if !seen.insert((row.grade_label.clone(), row.subject.clone())) {
                errors.push(format!(
                    "Analysis for {} ({}) appears more than once.",
                    row.grade_label, row.subject
                ));
            }
        }
        into_result(errors)
    }

    pub fn validate_llc(rows: &[LlcInput]) -> Result<()> {
        let mut errors = Vec::new();
        check_positions("LLC", rows.iter().map(|r| r.position), LLC_POSITIONS, &mut errors);
        into_result(errors)
    }

    pub fn validate_top_lists(input: &mut TopListsInput) -> Result<()> {
        let mut errors = Vec::new();
        for (label, entries) in [
            ("Top DNME", &mut input.top_dnme),
            ("Top outstanding", &mut input.top_outstanding),
        ] {
            check_positions(label, entries.iter().map(|e| e.position), TOP_POSITIONS, &mut errors);
            for entry in entries.iter_mut() {
                entry.grade_label = entry.grade_label.trim().to_string();
                if entry.learner_count < 0 {
                    errors.push(format!(
                        "{} #{}: count cannot be negative.",
                        label, entry.position
                    ));
                }
            }
        }
        into_result(errors)
    }

    pub fn validate_interventions(label: &str, rows: &[InterventionInput]) -> Result<()> {
        let mut errors = Vec::new();
        check_positions(label, rows.iter().map(|r| r.position), INTERVENTION_POSITIONS, &mut errors);
        into_result(errors)
    }

    /// Grades use the RMA labels. Pairs are trimmed and cut to the text
    /// limit, blank pairs dropped and at most five kept.
    pub fn validate_difficulty_plans(plans: &mut [DifficultyPlanInput]) -> Result<()> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for plan in plans.iter_mut() {
            plan.grade_label = plan.grade_label.trim().to_ascii_lowercase();
            if !catalog::is_rma_grade_label(&plan.grade_label) {
                errors.push(format!("Unknown reading grade '{}'.", plan.grade_label));
            }
            if !seen.insert(plan.grade_label.clone()) {
                errors.push(format!(
                    "Reading plan for '{}' appears more than once.",
                    plan.grade_label
                ));
            }
            plan.data = normalize_pairs(&plan.data);
        }
        into_result(errors)
    }

    pub fn validate_signatories(input: &mut SignatoriesInput) -> Result<()> {
        let mut errors = Vec::new();
        for (value, label) in [
            (&mut input.prepared_by, "Prepared by"),
            (&mut input.submitted_to, "Submitted to"),
        ] {
            *value = value.trim().to_string();
            if value.chars().count() > SIGNATORY_LIMIT {
                errors.push(format!(
                    "{} must be at most {} characters.",
                    label, SIGNATORY_LIMIT
                ));
            }
        }
        into_result(errors)
    }
}

fn check_positions(
    label: &str,
    positions: impl Iterator<Item = i64>,
    max: i64,
    errors: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for position in positions {
        if !(1..=max).contains(&position) {
            errors.push(format!("{} position must be between 1 and {}.", label, max));
        } else if !seen.insert(position) {
            errors.push(format!("{} #{} appears more than once.", label, position));
        }
    }
}

fn clip(text: &str) -> String {
    text.trim().chars().take(DIFFICULTY_TEXT_LIMIT).collect()
}

pub fn normalize_pairs(pairs: &[DifficultyPair]) -> Vec<DifficultyPair> {
    pairs
        .iter()
        .map(|p| DifficultyPair {
            difficulty: clip(&p.difficulty),
            intervention: clip(&p.intervention),
        })
        .filter(|p| !(p.difficulty.is_empty() && p.intervention.is_empty()))
        .take(MAX_DIFFICULTY_PAIRS)
        .collect()
}

pub async fn slp_row_keys(pool: &SqlitePool, submission_id: i64) -> Result<Vec<(String, String)>> {
    Ok(sqlx::query_as::<_, (String, String)>(
        "SELECT grade_label, subject FROM slp_rows WHERE submission_id = ?",
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await?)
}

pub async fn replace_slp_analysis(pool: &SqlitePool, submission_id: i64, rows: &[SlpAnalysisInput]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM slp_analyses WHERE submission_id = ?")
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO slp_analyses
                (submission_id, grade_label, subject, dnme_factors, fs_factors, s_practices,
                 vs_practices, o_practices, overall_strategy)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission_id)
        .bind(&row.grade_label)
        .bind(&row.subject)
        .bind(&row.dnme_factors)
        .bind(&row.fs_factors)
        .bind(&row.s_practices)
        .bind(&row.vs_practices)
        .bind(&row.o_practices)
        .bind(&row.overall_strategy)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Drop analyses whose SLP row no longer exists.
pub async fn prune_slp_analyses(conn: &mut SqliteConnection, submission_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM slp_analyses
        WHERE submission_id = ?
          AND NOT EXISTS (
              SELECT 1 FROM slp_rows r
              WHERE r.submission_id = slp_analyses.submission_id
                AND r.grade_label = slp_analyses.grade_label
                AND r.subject = slp_analyses.subject
          )
        "#,
    )
    .bind(submission_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn replace_llc(pool: &SqlitePool, submission_id: i64, rows: &[LlcInput]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM slp_llc_entries WHERE submission_id = ?")
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;
    for row in rows {
        sqlx::query(
            "INSERT INTO slp_llc_entries (submission_id, position, llc_description, intervention) VALUES (?, ?, ?, ?)",
        )
        .bind(submission_id)
        .bind(row.position)
        .bind(row.llc_description.trim())
        .bind(row.intervention.trim())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn replace_top_lists(pool: &SqlitePool, submission_id: i64, input: &TopListsInput) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM slp_top_entries WHERE submission_id = ?")
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;
    for (kind, entries) in [(TOP_DNME, &input.top_dnme), (TOP_OUTSTANDING, &input.top_outstanding)] {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO slp_top_entries (submission_id, kind, position, grade_label, learner_count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(kind)
            .bind(entry.position)
            .bind(&entry.grade_label)
            .bind(entry.learner_count)
            .execute(&mut *tx)
            .await?;
        }
    }
    ensure_top_entries(&mut tx, submission_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Which intervention list a payload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionList {
    Reading,
    Rma,
}

impl InterventionList {
    fn table(&self) -> &'static str {
        match self {
            InterventionList::Reading => "reading_interventions",
            InterventionList::Rma => "rma_interventions",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InterventionList::Reading => "Reading intervention",
            InterventionList::Rma => "RMA intervention",
        }
    }
}

pub async fn replace_interventions(
    pool: &SqlitePool,
    submission_id: i64,
    list: InterventionList,
    rows: &[InterventionInput],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(&format!("DELETE FROM {} WHERE submission_id = ?", list.table()))
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;
    for row in rows {
        sqlx::query(&format!(
            "INSERT INTO {} (submission_id, position, description) VALUES (?, ?, ?)",
            list.table()
        ))
        .bind(submission_id)
        .bind(row.position)
        .bind(row.description.trim())
        .execute(&mut *tx)
        .await?;
    }
    ensure_interventions(&mut tx, submission_id, list).await?;
    tx.commit().await?;
    Ok(())
}

/// Replace the plans recorded under `timing`; plans of other timings stay.
pub async fn replace_difficulty_plans(
    pool: &SqlitePool,
    submission_id: i64,
    timing: &str,
    plans: &[DifficultyPlanInput],
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM reading_difficulty_plans WHERE submission_id = ? AND period = ?")
        .bind(submission_id)
        .bind(timing)
        .execute(&mut *tx)
        .await?;
    for plan in plans {
        sqlx::query(
            r#"
            INSERT INTO reading_difficulty_plans (submission_id, period, grade_label, data, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission_id)
        .bind(timing)
        .bind(&plan.grade_label)
        .bind(Json(&plan.data))
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn save_signatories(pool: &SqlitePool, submission_id: i64, input: &SignatoriesInput) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO signatories (submission_id, prepared_by, submitted_to) VALUES (?, ?, ?)
        ON CONFLICT (submission_id) DO UPDATE SET
            prepared_by = excluded.prepared_by,
            submitted_to = excluded.submitted_to
        "#,
    )
    .bind(submission_id)
    .bind(&input.prepared_by)
    .bind(&input.submitted_to)
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_top_entries(conn: &mut SqliteConnection, submission_id: i64) -> Result<()> {
    for kind in [TOP_DNME, TOP_OUTSTANDING] {
        for position in 1..=TOP_POSITIONS {
            sqlx::query(
                r#"
                INSERT INTO slp_top_entries (submission_id, kind, position)
                VALUES (?, ?, ?)
                ON CONFLICT (submission_id, kind, position) DO NOTHING
                "#,
            )
            .bind(submission_id)
            .bind(kind)
            .bind(position)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn ensure_interventions(conn: &mut SqliteConnection, submission_id: i64, list: InterventionList) -> Result<()> {
    for position in 1..=INTERVENTION_POSITIONS {
        sqlx::query(&format!(
            "INSERT INTO {} (submission_id, position) VALUES (?, ?) ON CONFLICT (submission_id, position) DO NOTHING",
            list.table()
        ))
        .bind(submission_id)
        .bind(position)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Seed the fixed-position lists and an empty signatories block, leaving
/// existing rows alone.
pub async fn ensure_plan_rows(conn: &mut SqliteConnection, submission_id: i64) -> Result<()> {
    ensure_top_entries(conn, submission_id).await?;
    ensure_interventions(conn, submission_id, InterventionList::Reading).await?;
    ensure_interventions(conn, submission_id, InterventionList::Rma).await?;
    sqlx::query("INSERT INTO signatories (submission_id) VALUES (?) ON CONFLICT (submission_id) DO NOTHING")
        .bind(submission_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn load_plan_rows(pool: &SqlitePool, submission_id: i64) -> Result<PlanRows> {
    let top: Vec<SlpTopEntry> = sqlx::query_as(
        "SELECT * FROM slp_top_entries WHERE submission_id = ? ORDER BY kind, position",
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await?;
    let (slp_top_dnme, slp_top_outstanding): (Vec<_>, Vec<_>) =
        top.into_iter().partition(|e| e.kind == TOP_DNME);

    Ok(PlanRows {
        slp_analysis: sqlx::query_as("SELECT * FROM slp_analyses WHERE submission_id = ? ORDER BY id")
            .bind(submission_id)
            .fetch_all(pool)
            .await?,
        slp_llc: sqlx::query_as(
            "SELECT * FROM slp_llc_entries WHERE submission_id = ? ORDER BY position",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?,
        slp_top_dnme,
        slp_top_outstanding,
        reading_interventions: sqlx::query_as(
            "SELECT * FROM reading_interventions WHERE submission_id = ? ORDER BY position",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?,
        reading_difficulties: sqlx::query_as(
            "SELECT * FROM reading_difficulty_plans WHERE submission_id = ? ORDER BY period, grade_label",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?,
        rma_interventions: sqlx::query_as(
            "SELECT * FROM rma_interventions WHERE submission_id = ? ORDER BY position",
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?,
        signatories: sqlx::query_as("SELECT * FROM signatories WHERE submission_id = ?")
            .bind(submission_id)
            .fetch_optional(pool)
            .await?,
    })
}
