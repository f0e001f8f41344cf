//! SGOD division overview: per-district submission and learning summaries.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use super::calculator::rows_for;
use super::gaps::districts_of;
use super::kpi::round_to;
use crate::accounts::{guards, scope, Actor};
use crate::database::models::{AdmRow, District, Period, RmaRow, School, Section, SlpRow};
use crate::database::queries::Queries;
use crate::error::Result;
use crate::organizations::{self, Directory};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverviewFilter {
    #[serde(default)]
    pub period_id: Option<i64>,
    #[serde(default)]
    pub district_id: Option<i64>,
    #[serde(default)]
    pub section_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchoolProfileEntry {
    pub school: School,
    pub head_name: String,
    pub head_contact: String,
    pub grade_span: String,
    pub strands: String,
    pub missing_profile: bool,
    pub missing_head_name: bool,
    pub missing_head_contact: bool,
    pub grade_span_warning: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictOverview {
    pub district: Option<District>,
    pub district_name: String,
    pub total_schools: usize,
    pub submitted_count: usize,
    pub missing_count: usize,
    pub completion_rate: f64,
    pub dnme_percent: f64,
    pub total_dnme: i64,
    pub total_enrolment: i64,
    pub average_burn_rate: f64,
    pub adm_burn_rate_sum: f64,
    pub adm_records: usize,
    pub school_profiles: Vec<SchoolProfileEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewSummary {
    pub total_schools: usize,
    pub submitted_count: usize,
    pub completion_rate: f64,
    pub dnme_percent: f64,
    pub average_burn_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCard {
    pub label: &'static str,
    pub value: serde_json::Value,
    pub hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DivisionOverview {
    pub periods: Vec<Period>,
    pub selected_period: Option<Period>,
    pub sections: Vec<Section>,
    pub selected_section_code: String,
    pub districts: Vec<District>,
    pub selected_district_id: Option<i64>,
    pub kpi_rows: Vec<DistrictOverview>,
    pub summary: Option<OverviewSummary>,
    pub summary_cards: Vec<SummaryCard>,
}

/// `part / total * 100` to two decimals; 0 when `total` is 0.
fn rate(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        round_to(part / total * 100.0, 2)
    }
}

fn average(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round_to(sum / count as f64, 2)
    }
}

#[derive(Debug, FromRow)]
struct PeriodSubmission {
    id: i64,
    school_id: i64,
}

async fn completed_for_period(
    pool: &SqlitePool,
    period_id: i64,
    section_code: &str,
) -> Result<Vec<PeriodSubmission>> {
    let rows = sqlx::query_as::<_, PeriodSubmission>(
        r#"
        SELECT s.id, s.school_id
        FROM submissions s
        JOIN form_templates t ON t.id = s.form_template_id
        JOIN sections sec ON sec.id = t.section_id
        WHERE s.period_id = ? AND lower(sec.code) = lower(?)
          AND s.status IN ('submitted', 'noted')
        "#,
    )
    .bind(period_id)
    .bind(section_code)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Default)]
struct DistrictTally {
    district: Option<District>,
    schools: Vec<School>,
    submitted: HashSet<i64>,
    total_dnme: i64,
    total_enrolment: i64,
    burn_rate_sum: f64,
    adm_records: usize,
    span_mismatches: HashSet<i64>,
}

impl DistrictTally {
    fn finish(self, directory: &Directory) -> DistrictOverview {
        let total_schools = self.schools.len();
        let submitted_count = self.submitted.len();
        let mut schools = self.schools;
        schools.sort_by(|a, b| a.name.cmp(&b.name));
        let school_profiles = schools
            .into_iter()
            .map(|school| {
                let profile = directory.profile(school.id);
                let head_name = profile.map(|p| p.head_name.clone()).unwrap_or_default();
                let head_contact = profile.map(|p| p.head_contact.clone()).unwrap_or_default();
                SchoolProfileEntry {
                    grade_span: organizations::grade_span_label(&school, profile),
                    strands: profile.map(|p| p.strands.join(", ")).unwrap_or_default(),
                    missing_profile: profile.is_none(),
                    missing_head_name: head_name.trim().is_empty(),
                    missing_head_contact: head_contact.trim().is_empty(),
                    grade_span_warning: self.span_mismatches.contains(&school.id),
                    head_name,
                    head_contact,
                    school,
                }
            })
            .collect();

        DistrictOverview {
            district_name: self.district.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
            district: self.district,
            total_schools,
            submitted_count,
            missing_count: total_schools - submitted_count,
            completion_rate: rate(submitted_count as f64, total_schools as f64),
            dnme_percent: rate(self.total_dnme as f64, self.total_enrolment as f64),
            total_dnme: self.total_dnme,
            total_enrolment: self.total_enrolment,
            average_burn_rate: average(self.burn_rate_sum, self.adm_records),
            adm_burn_rate_sum: self.burn_rate_sum,
            adm_records: self.adm_records,
            school_profiles,
        }
    }
}

pub fn summarize(rows: &[DistrictOverview]) -> Option<OverviewSummary> {
    if rows.is_empty() {
        return None;
    }
    let total_schools: usize = rows.iter().map(|r| r.total_schools).sum();
    let submitted_count: usize = rows.iter().map(|r| r.submitted_count).sum();
    let total_dnme: i64 = rows.iter().map(|r| r.total_dnme).sum();
    let total_enrolment: i64 = rows.iter().map(|r| r.total_enrolment).sum();
    let burn_sum: f64 = rows.iter().map(|r| r.adm_burn_rate_sum).sum();
    let adm_records: usize = rows.iter().map(|r| r.adm_records).sum();
    Some(OverviewSummary {
        total_schools,
        submitted_count,
        completion_rate: rate(submitted_count as f64, total_schools as f64),
        dnme_percent: rate(total_dnme as f64, total_enrolment as f64),
        average_burn_rate: average(burn_sum, adm_records),
    })
}

pub fn summary_cards(summary: Option<&OverviewSummary>) -> Vec<SummaryCard> {
    let Some(summary) = summary else {
        return Vec::new();
    };
    vec![
        SummaryCard {
            label: "Total schools",
            value: summary.total_schools.into(),
            hint: "Across selected filters".to_string(),
            tone: None,
        },
        SummaryCard {
            label: "Submitted",
            value: summary.submitted_count.into(),
            hint: format!("Completion rate {}%", summary.completion_rate),
            tone: Some("success"),
        },
        SummaryCard {
            label: "DNME %",
            value: summary.dnme_percent.into(),
            hint: "Learners who did not meet expectations".to_string(),
            tone: None,
        },
        SummaryCard {
            label: "Avg ADM burn rate %",
            value: summary.average_burn_rate.into(),
            hint: "Weighted by ADM records".to_string(),
            tone: None,
        },
    ]
}

pub async fn division_overview(
    pool: &SqlitePool,
    actor: &Actor,
    filter: &OverviewFilter,
) -> Result<DivisionOverview> {
    guards::require_sgod_admin(actor)?;

    let periods = Queries::list_periods(pool).await?;
    let selected_period = match filter.period_id {
        Some(id) => Some(Queries::get_period(pool, id).await?),
        None => periods.first().cloned(),
    };

    let sections = Queries::list_sections(pool).await?;
    let requested = filter
        .section_code
        .as_deref()
        .map(str::trim)
        .filter(|code| sections.iter().any(|s| s.code.eq_ignore_ascii_case(code)));
    let section_code = match requested {
        Some(code) => code.to_string(),
        None => sections
            .first()
            .map(|s| s.code.clone())
            .unwrap_or_else(|| super::calculator::DEFAULT_SECTION_CODE.to_string()),
    };

    let directory = Directory::load(pool).await?;
    let visible = scope::scope_schools(pool, actor)
        .await?
        .filter_schools(directory.schools.clone());
    let districts = districts_of(&visible, &directory);

    let mut tallies: HashMap<Option<i64>, DistrictTally> = HashMap::new();
    for school in visible
        .into_iter()
        .filter(|s| filter.district_id.is_none() || s.district_id == filter.district_id)
    {
        let tally = tallies.entry(school.district_id).or_insert_with(|| DistrictTally {
            district: school
                .district_id
                .and_then(|id| directory.districts.get(&id))
                .cloned(),
            ..Default::default()
        });
        tally.schools.push(school);
    }
    let district_of: HashMap<i64, Option<i64>> = tallies
        .iter()
        .flat_map(|(district, tally)| tally.schools.iter().map(move |s| (s.id, *district)))
        .collect();

    if let Some(period) = &selected_period {
        let submissions: Vec<PeriodSubmission> = completed_for_period(pool, period.id, &section_code)
            .await?
            .into_iter()
            .filter(|s| district_of.contains_key(&s.school_id))
            .collect();
        let ids: Vec<i64> = submissions.iter().map(|s| s.id).collect();
        let slp: Vec<SlpRow> = rows_for(pool, "slp_rows", &ids).await?;
        let rma: Vec<RmaRow> = rows_for(pool, "rma_rows", &ids).await?;
        let adm: Vec<AdmRow> = rows_for(pool, "adm_rows", &ids).await?;

        for submission in &submissions {
            let Some(tally) = district_of
                .get(&submission.school_id)
                .and_then(|district| tallies.get_mut(district))
            else {
                continue;
            };
            let slp_rows: Vec<&SlpRow> = slp.iter().filter(|r| r.submission_id == submission.id).collect();
            if let Some(school) = directory.school(submission.school_id) {
                let labels = slp_rows
                    .iter()
                    .map(|r| r.grade_label.as_str())
                    .chain(
                        rma.iter()
                            .filter(|r| r.submission_id == submission.id)
                            .map(|r| r.grade_label.as_str()),
                    );
                if organizations::has_grade_span_mismatch(
                    school,
                    directory.profile(school.id),
                    labels,
                ) {
                    tally.span_mismatches.insert(school.id);
                }
            }
            tally.submitted.insert(submission.school_id);
            for row in slp_rows.iter().filter(|r| r.is_offered) {
                tally.total_dnme += row.dnme;
                tally.total_enrolment += row.enrolment;
            }
            for row in adm.iter().filter(|r| r.submission_id == submission.id) {
                tally.burn_rate_sum += row.funds_percent_burn_rate;
                tally.adm_records += 1;
            }
        }
    }

    let mut kpi_rows: Vec<DistrictOverview> = tallies
        .into_values()
        .map(|tally| tally.finish(&directory))
        .collect();
    kpi_rows.sort_by(|a, b| a.district_name.cmp(&b.district_name));
    let summary = summarize(&kpi_rows);
    let summary_cards = summary_cards(summary.as_ref());
    debug!(
        "Division overview for section {} across {} district(s)",
        section_code,
        kpi_rows.len()
    );

    Ok(DivisionOverview {
        periods,
        selected_period,
        sections,
        selected_section_code: section_code,
        districts,
        selected_district_id: filter.district_id,
        kpi_rows,
        summary,
        summary_cards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, schools: usize, submitted: usize, dnme: i64, enrolment: i64) -> DistrictOverview {
        DistrictOverview {
            district: None,
            district_name: name.to_string(),
            total_schools: schools,
            submitted_count: submitted,
            missing_count: schools - submitted,
            completion_rate: rate(submitted as f64, schools as f64),
            dnme_percent: rate(dnme as f64, enrolment as f64),
            total_dnme: dnme,
            total_enrolment: enrolment,
            average_burn_rate: 0.0,
            adm_burn_rate_sum: 150.0,
            adm_records: 2,
            school_profiles: Vec::new(),
        }
    }

    #[test]
    fn test_rates_use_two_decimals() {
        assert_eq!(rate(1.0, 3.0), 33.33);
        assert_eq!(rate(2.0, 3.0), 66.67);
        assert_eq!(rate(5.0, 0.0), 0.0);
        assert_eq!(average(0.0, 0), 0.0);
    }

    #[test]
    fn test_summary_pools_district_totals() {
        let rows = vec![row("North", 2, 1, 3, 40), row("South", 1, 1, 1, 10)];
        let summary = summarize(&rows).unwrap();
        assert_eq!(summary.total_schools, 3);
        assert_eq!(summary.submitted_count, 2);
        assert_eq!(summary.completion_rate, 66.67);
        assert_eq!(summary.dnme_percent, 8.0);
        assert_eq!(summary.average_burn_rate, 75.0);
    }

    #[test]
    fn test_cards_follow_summary() {
        assert!(summary_cards(None).is_empty());
        let summary = summarize(&[row("North", 4, 2, 0, 0)]).unwrap();
        let cards = summary_cards(Some(&summary));
        assert_eq!(cards.len(), 4);
        assert_eq!(cards[1].hint, "Completion rate 50%");
        assert_eq!(cards[1].tone, Some("success"));
    }
}
