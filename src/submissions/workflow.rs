use chrono::Utc;
use html_escape::{encode_double_quoted_attribute, encode_text};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use super::forms;
use super::plans;
use super::status::{SubmissionStatus, Transition};
use crate::accounts::{guards, Actor};
use crate::dashboards::cache::DashboardCache;
use crate::database::models::Submission;
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};
use crate::notifications;

pub const CREATED_REMARKS: &str = "Submission created";

/// Drives submissions through draft -> submitted -> returned/noted and keeps
/// the timeline, the dashboard cache and school notifications in step.
#[derive(Clone)]
pub struct SubmissionWorkflow {
    pool: SqlitePool,
    cache: DashboardCache,
    site_url: String,
}

impl SubmissionWorkflow {
    pub fn new(pool: SqlitePool, cache: DashboardCache, site_url: impl Into<String>) -> Self {
        Self {
            pool,
            cache,
            site_url: site_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get or create the actor school's draft for a template and period.
    /// Returns the submission and whether it was created.
    pub async fn start(
        &self,
        actor: &Actor,
        template_id: i64,
        period_id: i64,
    ) -> Result<(Submission, bool)> {
        let school_id = actor.school_id.ok_or_else(|| {
            ReportsError::forbidden("No school is associated with your account.")
        })?;
        guards::require_school_head(actor, Some(school_id))?;

        let template = Queries::get_form_template(&self.pool, template_id).await?;
        if !template.is_active {
            return Err(ReportsError::not_found(format!(
                "form template {} is not active",
                template.code
            )));
        }
        Queries::get_period(&self.pool, period_id).await?;

        if let Some(existing) =
            Queries::find_submission(&self.pool, school_id, template_id, period_id).await?
        {
            return Ok((existing, false));
        }

        let school = Queries::get_school(&self.pool, school_id).await?;
        let profile = Queries::get_school_profile(&self.pool, school_id).await?;
        let span = crate::organizations::grade_span(&school, profile.as_ref());

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO submissions
                (school_id, form_template_id, period_id, status, created_at, updated_at, last_modified_by)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(school_id)
        .bind(template_id)
        .bind(period_id)
        .bind(SubmissionStatus::Draft)
        .bind(now)
        .bind(now)
        .bind(actor.user_id)
        .execute(&mut *tx)
        .await;

        let submission_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                // Lost a race with a concurrent start; use the winner.
                tx.rollback().await?;
                let existing =
                    Queries::find_submission(&self.pool, school_id, template_id, period_id)
                        .await?
                        .ok_or_else(|| ReportsError::not_found("submission"))?;
                return Ok((existing, false));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query(
            r#"
            INSERT INTO submission_timeline (submission_id, actor_id, from_status, to_status, remarks, created_at)
            VALUES (?, ?, '', ?, ?, ?)
            "#,
        )
        .bind(submission_id)
        .bind(actor.user_id)
        .bind(SubmissionStatus::Draft)
        .bind(CREATED_REMARKS)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        forms::ensure_pct_rows(&mut tx, submission_id).await?;
        forms::ensure_slp_rows(&mut tx, submission_id, &super::catalog::slp_grade_subject_pairs(span))
            .await?;
        plans::ensure_plan_rows(&mut tx, submission_id).await?;
        tx.commit().await?;

        info!(
            "Created draft submission {} for school {} ({} / period {})",
            submission_id, school_id, template.code, period_id
        );
        let submission = Queries::get_submission(&self.pool, submission_id).await?;
        Ok((submission, true))
    }

    pub async fn mark_submitted(&self, actor: &Actor, submission_id: i64) -> Result<Submission> {
        let submission = Queries::get_submission(&self.pool, submission_id).await?;
        guards::require_school_head(actor, Some(submission.school_id))?;
        Transition::Submit.check_from(submission.status)?;
        self.validate_ready_for_submission(submission_id).await?;
        self.apply(submission, Transition::Submit, actor, "").await
    }

    pub async fn mark_returned(
        &self,
        actor: &Actor,
        submission_id: i64,
        remarks: &str,
    ) -> Result<Submission> {
        let submission = Queries::get_submission(&self.pool, submission_id).await?;
        self.require_reviewer_of(actor, &submission).await?;
        Transition::Return.check_from(submission.status)?;
        let remarks = remarks.trim();
        if remarks.is_empty() {
            return Err(ReportsError::validation(
                "Remarks are required when returning a submission.",
            ));
        }
        self.apply(submission, Transition::Return, actor, remarks).await
    }

    pub async fn mark_noted(
        &self,
        actor: &Actor,
        submission_id: i64,
        remarks: Option<&str>,
    ) -> Result<Submission> {
        let submission = Queries::get_submission(&self.pool, submission_id).await?;
        self.require_reviewer_of(actor, &submission).await?;
        Transition::Note.check_from(submission.status)?;
        self.apply(submission, Transition::Note, actor, remarks.unwrap_or("").trim())
            .await
    }

    /// Send a submission back to draft from any state. SGOD only.
    pub async fn mark_draft(&self, actor: &Actor, submission_id: i64) -> Result<Submission> {
        guards::require_sgod_admin(actor)?;
        let submission = Queries::get_submission(&self.pool, submission_id).await?;
        self.apply(submission, Transition::Reopen, actor, "").await
    }

    /// At least one project, and every project has at least one activity.
    pub async fn validate_ready_for_submission(&self, submission_id: i64) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT p.project_title AS project_title, COUNT(a.id) AS activity_total
            FROM smea_projects p
            LEFT JOIN smea_activities a ON a.project_id = p.id
            WHERE p.submission_id = ?
            GROUP BY p.id
            ORDER BY p.id
            "#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await?;

        let projects: Vec<(String, i64)> = rows
            .iter()
            .map(|row| (row.get("project_title"), row.get("activity_total")))
            .collect();
        let errors = readiness_errors(&projects);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReportsError::Validation(errors))
        }
    }

    async fn require_reviewer_of(&self, actor: &Actor, submission: &Submission) -> Result<()> {
        let template = Queries::get_form_template(&self.pool, submission.form_template_id).await?;
        let section = Queries::get_section(&self.pool, template.section_id).await?;
        guards::require_section_admin(actor, Some(&section.code))
    }

    async fn apply(
        &self,
        submission: Submission,
        transition: Transition,
        actor: &Actor,
        remarks: &str,
    ) -> Result<Submission> {
        let from = submission.status;
        let target = transition.target();
        if from == target {
            return Ok(submission);
        }

        let now = Utc::now();
        let (submitted_at, submitted_by) = match transition {
            Transition::Submit => (Some(now), Some(actor.user_id)),
            _ => (submission.submitted_at, submission.submitted_by),
        };
        // Remarks of the previous cycle survive; only the stamps are cleared.
        let (returned_at, returned_by, returned_remarks) = match target {
            SubmissionStatus::Returned => (Some(now), Some(actor.user_id), remarks.to_string()),
            _ => (None, None, submission.returned_remarks.clone()),
        };
        let (noted_at, noted_by, noted_remarks) = match target {
            SubmissionStatus::Noted => (Some(now), Some(actor.user_id), remarks.to_string()),
            _ => (None, None, submission.noted_remarks.clone()),
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE submissions
            SET status = ?, submitted_at = ?, submitted_by = ?,
                returned_at = ?, returned_by = ?, returned_remarks = ?,
                noted_at = ?, noted_by = ?, noted_remarks = ?,
                last_modified_by = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(target)
        .bind(submitted_at)
        .bind(submitted_by)
        .bind(returned_at)
        .bind(returned_by)
        .bind(&returned_remarks)
        .bind(noted_at)
        .bind(noted_by)
        .bind(&noted_remarks)
        .bind(actor.user_id)
        .bind(now)
        .bind(submission.id)
        .bind(from)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(ReportsError::Conflict(format!(
                "Submission {} changed while it was being updated.",
                submission.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO submission_timeline (submission_id, actor_id, from_status, to_status, remarks, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission.id)
        .bind(actor.user_id)
        .bind(from)
        .bind(target)
        .bind(remarks)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "Submission {} moved {} -> {} by {}",
            submission.id, from, target, actor.username
        );
        self.cache.invalidate_school(submission.school_id).await;

        if let Err(e) = self.notify_school(&submission, target, remarks).await {
            warn!(
                "Could not queue notification for submission {}: {}",
                submission.id, e
            );
        }

        Queries::get_submission(&self.pool, submission.id).await
    }

    async fn notify_school(
        &self,
        submission: &Submission,
        target: SubmissionStatus,
        remarks: &str,
    ) -> Result<()> {
        let Some(to_email) = Queries::get_school_profile(&self.pool, submission.school_id)
            .await?
            .and_then(|p| p.notification_email)
            .filter(|email| !email.trim().is_empty())
        else {
            return Ok(());
        };

        let template = Queries::get_form_template(&self.pool, submission.form_template_id).await?;
        let section = Queries::get_section(&self.pool, template.section_id).await?;
        let period = Queries::get_period(&self.pool, submission.period_id).await?;
        let context = EmailContext {
            title: &template.title,
            section: &section.name,
            period: &period.label,
            submission_url: submission_url(&self.site_url, submission.id),
        };

        let Some((subject, body, html_body)) = render_status_email(target, &context, remarks) else {
            return Ok(());
        };
        notifications::queue_email(&self.pool, &to_email, &subject, &body, Some(&html_body)).await?;
        Ok(())
    }
}

pub fn submission_url(site_url: &str, submission_id: i64) -> String {
    format!("{}/submissions/submission/{}/", site_url, submission_id)
}

pub struct EmailContext<'a> {
    pub title: &'a str,
    pub section: &'a str,
    pub period: &'a str,
    pub submission_url: String,
}

/// Subject, plain-text body and HTML body for a status change. Drafts send
/// nothing.
pub fn render_status_email(
    target: SubmissionStatus,
    ctx: &EmailContext<'_>,
    remarks: &str,
) -> Option<(String, String, String)> {
    let (verb, remarks) = match target {
        SubmissionStatus::Returned => (
            "returned",
            Some(if remarks.is_empty() { "No remarks provided." } else { remarks }),
        ),
        SubmissionStatus::Noted => (
            "noted",
            Some(if remarks.is_empty() { "No remarks." } else { remarks }),
        ),
        SubmissionStatus::Submitted => ("submitted", None),
        SubmissionStatus::Draft => return None,
    };

    let subject = format!(
        "{}: {} \u{2014} {} ({})",
        target.label(),
        ctx.title,
        ctx.section,
        ctx.period
    );

    let mut body = format!(
        "Your report \"{}\" for {} ({}) has been {}.\n",
        ctx.title, ctx.section, ctx.period, verb
    );
    let mut html_body = format!(
        "<p>Your report <strong>{}</strong> for {} ({}) has been {}.</p>",
        encode_text(ctx.title),
        encode_text(ctx.section),
        encode_text(ctx.period),
        verb
    );
    if let Some(remarks) = remarks {
        body.push_str(&format!("\nRemarks: {}\n", remarks));
        html_body.push_str(&format!("<p>Remarks: {}</p>", encode_text(remarks)));
    }
    body.push_str(&format!("\nView the submission: {}\n", ctx.submission_url));
    html_body.push_str(&format!(
        "<p><a href=\"{}\">{}</a></p>",
        encode_double_quoted_attribute(&ctx.submission_url),
        encode_text(&ctx.submission_url)
    ));

    Some((subject, body, html_body))
}

/// Readiness messages for (project title, activity count) pairs.
pub fn readiness_errors(projects: &[(String, i64)]) -> Vec<String> {
    if projects.is_empty() {
        return vec!["Add at least one project before submitting.".to_string()];
    }
    let missing: Vec<&str> = projects
        .iter()
        .filter(|(_, activities)| *activities == 0)
        .map(|(title, _)| {
            if title.trim().is_empty() {
                "Untitled project"
            } else {
                title.as_str()
            }
        })
        .collect();
    if missing.is_empty() {
        Vec::new()
    } else {
        vec![format!(
            "Each project must have at least one activity. Missing activities for: {}",
            missing.join(", ")
        )]
    }
}
