//! Per-section completion indicators for the school's form view.

use serde::Serialize;

use super::forms::SubmissionRows;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionStatus {
    Complete,
    InProgress,
    NotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionCompletion {
    pub section: &'static str,
    pub status: CompletionStatus,
    pub detail: String,
    pub progress: u8,
}

impl SectionCompletion {
    fn new(section: &'static str, status: CompletionStatus, detail: impl Into<String>, progress: u8) -> Self {
        Self {
            section,
            status,
            detail: detail.into(),
            progress,
        }
    }
}

fn percent_of(part: usize, total: usize) -> u8 {
    if total == 0 {
        0
    } else {
        (part * 100 / total) as u8
    }
}

fn by_ratio(section: &'static str, done: usize, total: usize, detail: String) -> SectionCompletion {
    let progress = percent_of(done, total);
    let status = match progress {
        100 => CompletionStatus::Complete,
        0 => CompletionStatus::NotStarted,
        _ => CompletionStatus::InProgress,
    };
    SectionCompletion::new(section, status, detail, progress)
}

pub fn section_completion(rows: &SubmissionRows) -> Vec<SectionCompletion> {
    vec![
        projects(rows),
        pct(rows),
        slp(rows),
        reading(rows),
        rma(rows),
        supervision(rows),
        adm(rows),
    ]
}

/// Integer mean of the section progress values.
pub fn overall_progress(sections: &[SectionCompletion]) -> u8 {
    if sections.is_empty() {
        return 0;
    }
    let total: usize = sections.iter().map(|s| s.progress as usize).sum();
    (total / sections.len()) as u8
}

fn projects(rows: &SubmissionRows) -> SectionCompletion {
    let projects = rows.projects.len();
    let activities: usize = rows.projects.iter().map(|p| p.activities.len()).sum();
    let detail = format!("{} project(s), {} activit(ies)", projects, activities);
    if projects > 0 && activities > 0 {
        SectionCompletion::new("projects", CompletionStatus::Complete, detail, 100)
    } else {
        SectionCompletion::new("projects", CompletionStatus::NotStarted, detail, 0)
    }
}

fn pct(rows: &SubmissionRows) -> SectionCompletion {
    let total = rows.pct.len();
    let filled = rows
        .pct
        .iter()
        .filter(|r| r.percent.is_some() || !r.action_points.trim().is_empty())
        .count();
    by_ratio("pct", filled, total, format!("{} of {} areas filled", filled, total))
}

fn slp(rows: &SubmissionRows) -> SectionCompletion {
    let offered: Vec<_> = rows.slp.iter().filter(|r| r.is_offered).collect();
    if offered.is_empty() {
        return SectionCompletion::new(
            "slp",
            CompletionStatus::NotStarted,
            "No subjects marked as offered",
            0,
        );
    }
    let done = offered
        .iter()
        .filter(|r| {
            let has_counts = [r.dnme, r.fs, r.s, r.vs, r.o].iter().any(|c| *c > 0);
            let has_analysis = !r.top_three_llc.trim().is_empty()
                || !r.intervention_plan.trim().is_empty()
                || rows.plans.slp_analysis.iter().any(|a| {
                    a.grade_label == r.grade_label && a.subject == r.subject && a.has_content()
                });
            has_counts && has_analysis
        })
        .count();
    by_ratio(
        "slp",
        done,
        offered.len(),
        format!("{} of {} offered subjects complete", done, offered.len()),
    )
}

fn reading(rows: &SubmissionRows) -> SectionCompletion {
    let entered = rows.crla.iter().any(|r| {
        [r.mt_grade_1, r.mt_grade_2, r.mt_grade_3, r.fil_grade_2, r.fil_grade_3, r.eng_grade_3]
            .iter()
            .any(|c| *c > 0)
    }) || rows
        .philiri
        .iter()
        .any(|r| r.eng_counts().iter().chain(r.fil_counts().iter()).any(|c| *c > 0));
    let present = rows.crla.len() + rows.philiri.len();
    presence("reading", entered, present, 60)
}

fn rma(rows: &SubmissionRows) -> SectionCompletion {
    let entered = rows.rma.iter().any(|r| {
        r.enrolment > 0
            || [
                r.emerging_not_proficient,
                r.emerging_low_proficient,
                r.developing_nearly_proficient,
                r.transitioning_proficient,
                r.at_grade_level,
            ]
            .iter()
            .any(|c| *c > 0)
    });
    presence("rma", entered, rows.rma.len(), 60)
}

fn supervision(rows: &SubmissionRows) -> SectionCompletion {
    let entered = rows.supervision.iter().any(|r| {
        r.teachers_supervised_observed_ta > 0
            || !r.intervention_support_provided.trim().is_empty()
            || !r.result.trim().is_empty()
    });
    presence("supervision", entered, rows.supervision.len(), 50)
}

fn presence(section: &'static str, entered: bool, rows: usize, partial: u8) -> SectionCompletion {
    if entered {
        SectionCompletion::new(section, CompletionStatus::Complete, format!("{} row(s)", rows), 100)
    } else if rows > 0 {
        SectionCompletion::new(
            section,
            CompletionStatus::InProgress,
            format!("{} empty row(s)", rows),
            partial,
        )
    } else {
        SectionCompletion::new(section, CompletionStatus::NotStarted, "No data yet", 0)
    }
}

fn adm(rows: &SubmissionRows) -> SectionCompletion {
    match &rows.adm_header {
        Some(header) if !header.is_offered => {
            SectionCompletion::new("adm", CompletionStatus::Complete, "ADM not offered", 100)
        }
        Some(_) if !rows.adm.is_empty() => SectionCompletion::new(
            "adm",
            CompletionStatus::Complete,
            format!("{} PPA row(s)", rows.adm.len()),
            100,
        ),
        Some(_) => SectionCompletion::new(
            "adm",
            CompletionStatus::InProgress,
            "ADM offered, no PPAs yet",
            50,
        ),
        None => SectionCompletion::new("adm", CompletionStatus::NotStarted, "No data yet", 0),
    }
}
