//! Reviewer-facing views: the section queue, submission detail and actions.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::accounts::{guards, scope, Actor};
use crate::database::models::*;
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};
use crate::organizations;
use crate::submissions::completion::{self, SectionCompletion};
use crate::submissions::forms::{self, SubmissionRows};
use crate::submissions::templates::reading_timing;
use crate::submissions::{SubmissionStatus, SubmissionWorkflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewTab {
    Pending,
    Returned,
    Noted,
}

impl ReviewTab {
    pub const ALL: [ReviewTab; 3] = [ReviewTab::Pending, ReviewTab::Returned, ReviewTab::Noted];

    /// Unknown tabs fall back to pending.
    pub fn parse(tab: Option<&str>) -> Self {
        match tab.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("returned") => ReviewTab::Returned,
            Some("noted") => ReviewTab::Noted,
            _ => ReviewTab::Pending,
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        match self {
            ReviewTab::Pending => SubmissionStatus::Submitted,
            ReviewTab::Returned => SubmissionStatus::Returned,
            ReviewTab::Noted => SubmissionStatus::Noted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewTab::Pending => "pending",
            ReviewTab::Returned => "returned",
            ReviewTab::Noted => "noted",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueFilter {
    pub tab: Option<String>,
    pub school_year: Option<i64>,
    pub quarter: Option<String>,
    pub period_id: Option<i64>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QueueItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: Submission,
    pub school_name: String,
    pub form_code: String,
    pub form_title: String,
    pub period_label: String,
    pub school_year_start: i64,
    pub quarter_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuickStats {
    pub pending_total: usize,
    pub submitted_today: usize,
    pub returned_total: usize,
    pub noted_this_week: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueue {
    pub section: Section,
    pub tab: ReviewTab,
    pub submissions: Vec<QueueItem>,
    pub tab_counts: BTreeMap<&'static str, usize>,
    pub quick_stats: QuickStats,
    pub available_school_years: Vec<i64>,
}

/// Monday of the week containing `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// Quick stats over the filtered (not tab-limited) queue. Timestamps are
/// compared as calendar dates in `tz`, the zone `today` was taken in.
pub fn quick_stats<Tz: TimeZone>(items: &[QueueItem], today: NaiveDate, tz: &Tz) -> QuickStats {
    let monday = week_start(today);
    let local_day = |t: DateTime<Utc>| t.with_timezone(tz).date_naive();
    let count = |status: SubmissionStatus| {
        items
            .iter()
            .filter(|i| i.submission.status == status)
            .count()
    };
    QuickStats {
        pending_total: count(SubmissionStatus::Submitted),
        submitted_today: items
            .iter()
            .filter(|i| i.submission.status == SubmissionStatus::Submitted)
            .filter(|i| i.submission.submitted_at.map(local_day) == Some(today))
            .count(),
        returned_total: count(SubmissionStatus::Returned),
        noted_this_week: items
            .iter()
            .filter(|i| i.submission.status == SubmissionStatus::Noted)
            .filter(|i| {
                i.submission
                    .noted_at
                    .map(|t| local_day(t) >= monday)
                    .unwrap_or(false)
            })
            .count(),
    }
}

fn matches_filter(item: &QueueItem, filter: &QueueFilter) -> bool {
    if let Some(year) = filter.school_year {
        if item.school_year_start != year {
            return false;
        }
    }
    if let Some(quarter) = filter.quarter.as_deref().filter(|q| !q.is_empty()) {
        if !item.quarter_tag.eq_ignore_ascii_case(quarter) {
            return false;
        }
    }
    if let Some(period_id) = filter.period_id {
        if item.submission.period_id != period_id {
            return false;
        }
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let needle = q.to_lowercase();
        if !item.school_name.to_lowercase().contains(&needle)
            && !item.form_title.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    true
}

pub async fn review_queue(
    pool: &SqlitePool,
    actor: &Actor,
    section_code: &str,
    filter: &QueueFilter,
    today: NaiveDate,
) -> Result<ReviewQueue> {
    let section = Queries::get_section_by_code(pool, section_code).await?;
    if !(actor.is_section_admin(Some(&section.code)) || actor.is_psds() || actor.is_sgod_admin()) {
        return Err(ReportsError::forbidden("Reviewer role required."));
    }

    let scope = scope::scope_schools(pool, actor).await?;
    let items = sqlx::query_as::<_, QueueItem>(
        r#"
        SELECT s.*, sc.name AS school_name, t.code AS form_code, t.title AS form_title,
               p.label AS period_label, p.school_year_start, p.quarter_tag
        FROM submissions s
        JOIN schools sc ON sc.id = s.school_id
        JOIN form_templates t ON t.id = s.form_template_id
        JOIN periods p ON p.id = s.period_id
        WHERE t.section_id = ?
        ORDER BY s.submitted_at DESC, s.updated_at DESC
        "#,
    )
    .bind(section.id)
    .fetch_all(pool)
    .await?;

    let base: Vec<QueueItem> = items
        .into_iter()
        .filter(|i| scope.contains(i.submission.school_id))
        .filter(|i| matches_filter(i, filter))
        .collect();

    let tab = ReviewTab::parse(filter.tab.as_deref());
    let tab_counts = ReviewTab::ALL
        .iter()
        .map(|t| {
            let n = base
                .iter()
                .filter(|i| i.submission.status == t.status())
                .count();
            (t.as_str(), n)
        })
        .collect();
    let quick_stats = quick_stats(&base, today, &Local);

    let mut available_school_years: Vec<i64> = Queries::list_periods(pool)
        .await?
        .into_iter()
        .filter(|p| p.is_active)
        .map(|p| p.school_year_start)
        .collect();
    available_school_years.sort_unstable_by(|a, b| b.cmp(a));
    available_school_years.dedup();

    let submissions = base
        .into_iter()
        .filter(|i| i.submission.status == tab.status())
        .collect();
    debug!("Review queue for {} ({}) built for {}", section.code, tab.as_str(), actor.username);

    Ok(ReviewQueue {
        section,
        tab,
        submissions,
        tab_counts,
        quick_stats,
        available_school_years,
    })
}

/// Subject with the highest DNME share among offered SLP rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnmeFocus {
    pub subject: String,
    pub grade: String,
    pub count: i64,
    pub pct: f64,
}

/// One focus grade per subject, ties broken by DNME count then lower grade.
pub fn dnme_recommendations(rows: &[SlpRow]) -> Vec<DnmeFocus> {
    let mut best: BTreeMap<String, (DnmeFocus, i64)> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_offered) {
        let pct = if row.enrolment > 0 {
            (row.dnme as f64 / row.enrolment as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        let order = organizations::extract_grade_number(&row.grade_label).unwrap_or(999);
        let candidate = DnmeFocus {
            subject: row.subject.clone(),
            grade: row.grade_label.clone(),
            count: row.dnme,
            pct,
        };
        let replace = match best.get(&row.subject) {
            None => true,
            Some((current, current_order)) => {
                (candidate.pct, candidate.count, -order)
                    > (current.pct, current.count, -current_order)
            }
        };
        if replace {
            best.insert(row.subject.clone(), (candidate, order));
        }
    }
    best.into_values().map(|(focus, _)| focus).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub school: School,
    pub school_profile: Option<SchoolProfile>,
    pub template: FormTemplate,
    pub section: Section,
    pub period: Period,
    pub reading_timing: &'static str,
    pub rows: SubmissionRows,
    pub timeline: Vec<TimelineEntry>,
    pub completion: Vec<SectionCompletion>,
    pub overall_progress: u8,
    pub dnme_recommendations: Vec<DnmeFocus>,
}

/// Everything attached to a submission. No permission checks.
pub async fn load_detail(pool: &SqlitePool, submission: Submission) -> Result<SubmissionDetail> {
    let school = Queries::get_school(pool, submission.school_id).await?;
    let school_profile = Queries::get_school_profile(pool, school.id).await?;
    let template = Queries::get_form_template(pool, submission.form_template_id).await?;
    let section = Queries::get_section(pool, template.section_id).await?;
    let period = Queries::get_period(pool, submission.period_id).await?;
    let rows = forms::load_rows(pool, submission.id).await?;
    let timeline = Queries::list_timeline(pool, submission.id).await?;
    let completion = completion::section_completion(&rows);
    let overall_progress = completion::overall_progress(&completion);
    let dnme_recommendations = dnme_recommendations(&rows.slp);

    Ok(SubmissionDetail {
        reading_timing: reading_timing(&template, &period),
        submission,
        school,
        school_profile,
        template,
        section,
        period,
        rows,
        timeline,
        completion,
        overall_progress,
        dnme_recommendations,
    })
}

async fn section_of(pool: &SqlitePool, submission: &Submission) -> Result<Section> {
    let template = Queries::get_form_template(pool, submission.form_template_id).await?;
    Queries::get_section(pool, template.section_id).await
}

pub async fn review_detail(
    pool: &SqlitePool,
    actor: &Actor,
    submission_id: i64,
) -> Result<SubmissionDetail> {
    let submission = Queries::get_submission(pool, submission_id).await?;
    let section = section_of(pool, &submission).await?;
    guards::require_section_admin(actor, Some(&section.code))?;
    load_detail(pool, submission).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewAction {
    pub action: String,
    #[serde(default)]
    pub remarks: String,
}

pub async fn review_action(
    workflow: &SubmissionWorkflow,
    actor: &Actor,
    submission_id: i64,
    action: &ReviewAction,
) -> Result<Submission> {
    match action.action.trim().to_ascii_lowercase().as_str() {
        "note" => {
            workflow
                .mark_noted(actor, submission_id, Some(&action.remarks))
                .await
        }
        "return" => {
            workflow
                .mark_returned(actor, submission_id, &action.remarks)
                .await
        }
        other => Err(ReportsError::validation(format!(
            "Unknown review action '{}'.",
            other
        ))),
    }
}

/// Read-only view for reviewers whose scope covers the submission.
pub async fn readonly_view(
    pool: &SqlitePool,
    actor: &Actor,
    submission_id: i64,
) -> Result<SubmissionDetail> {
    let submission = Queries::get_submission(pool, submission_id).await?;
    let scope = scope::scope_schools(pool, actor).await?;
    if !scope.contains(submission.school_id) {
        return Err(ReportsError::not_found(format!("submission {}", submission_id)));
    }
    let section = section_of(pool, &submission).await?;
    if !(actor.is_section_admin(Some(&section.code)) || actor.is_psds()) {
        return Err(ReportsError::forbidden("Reviewer role required."));
    }
    load_detail(pool, submission).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slp(subject: &str, grade: &str, enrolment: i64, dnme: i64, offered: bool) -> SlpRow {
        SlpRow {
            id: 0,
            submission_id: 1,
            grade_label: grade.to_string(),
            subject: subject.to_string(),
            enrolment,
            dnme,
            fs: 0,
            s: 0,
            vs: 0,
            o: 0,
            is_offered: offered,
            top_three_llc: String::new(),
            non_mastery_reasons: String::new(),
            non_mastery_other: String::new(),
            intervention_plan: String::new(),
        }
    }

    #[test]
    fn test_tab_parsing_defaults_to_pending() {
        assert_eq!(ReviewTab::parse(None), ReviewTab::Pending);
        assert_eq!(ReviewTab::parse(Some("archived")), ReviewTab::Pending);
        assert_eq!(ReviewTab::parse(Some("Noted")), ReviewTab::Noted);
        assert_eq!(ReviewTab::Returned.status(), SubmissionStatus::Returned);
    }

    #[test]
    fn test_week_starts_monday() {
        let thursday = NaiveDate::from_ymd_opt(2025, 10, 16).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2025, 10, 13).unwrap());
        let monday = NaiveDate::from_ymd_opt(2025, 10, 13).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    fn queue_item(status: SubmissionStatus, at: DateTime<Utc>) -> QueueItem {
        let submission = Submission {
            id: 1,
            school_id: 1,
            form_template_id: 1,
            period_id: 1,
            status,
            submitted_at: Some(at),
            submitted_by: None,
            returned_at: None,
            returned_by: None,
            returned_remarks: String::new(),
            noted_at: (status == SubmissionStatus::Noted).then_some(at),
            noted_by: None,
            noted_remarks: String::new(),
            created_at: at,
            updated_at: at,
            last_modified_by: None,
        };
        QueueItem {
            submission,
            school_name: "Alpha".to_string(),
            form_code: "smea".to_string(),
            form_title: "SMEA".to_string(),
            period_label: "Q1".to_string(),
            school_year_start: 2025,
            quarter_tag: "Q1".to_string(),
        }
    }

    #[test]
    fn test_quick_stats_use_local_calendar_days() {
        let manila = chrono::FixedOffset::east_opt(8 * 3600).unwrap();
        // 16:30 UTC on Sunday the 12th is 00:30 on Monday the 13th in Manila.
        let just_after_midnight = Utc.with_ymd_and_hms(2025, 10, 12, 16, 30, 0).unwrap();
        let items = vec![
            queue_item(SubmissionStatus::Submitted, just_after_midnight),
            queue_item(SubmissionStatus::Noted, just_after_midnight),
        ];
        let monday = NaiveDate::from_ymd_opt(2025, 10, 13).unwrap();

        let stats = quick_stats(&items, monday, &manila);
        assert_eq!(stats.pending_total, 1);
        assert_eq!(stats.submitted_today, 1);
        assert_eq!(stats.noted_this_week, 1);

        // Read as UTC dates the same instants fall on the previous Sunday.
        let stats = quick_stats(&items, monday, &Utc);
        assert_eq!(stats.submitted_today, 0);
        assert_eq!(stats.noted_this_week, 0);
    }

    #[test]
    fn test_dnme_focus_picks_highest_share() {
        let rows = vec![
            slp("english", "Grade 4", 20, 4, true),
            slp("english", "Grade 5", 10, 3, true),
            slp("english", "Grade 6", 10, 9, false),
            slp("mathematics", "Grade 4", 10, 2, true),
            slp("mathematics", "Grade 5", 20, 4, true),
        ];
        let focus = dnme_recommendations(&rows);
        assert_eq!(focus.len(), 2);
        assert_eq!(focus[0].subject, "english");
        assert_eq!(focus[0].grade, "Grade 5");
        assert_eq!(focus[0].pct, 30.0);
        // Equal share: higher count wins.
        assert_eq!(focus[1].grade, "Grade 5");
    }
}
