//! Loads completed submissions and their rows, then feeds them to the KPI
//! arithmetic per school or per period.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::kpi::{self, AdmKpi, CrlaKpi, ImplementationKpi, PhiliriKpi, RmaKpi, SlpKpi, SupervisionKpi};
use crate::accounts::SchoolScope;
use crate::database::models::*;
use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};

pub const DEFAULT_SECTION_CODE: &str = "smme";
pub const DEFAULT_ASSESSMENT_PERIOD: &str = "bosy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiPart {
    Implementation,
    Slp,
    Crla,
    Philiri,
    Rma,
    Supervision,
    Adm,
}

impl KpiPart {
    pub const ALL: [KpiPart; 7] = [
        KpiPart::Implementation,
        KpiPart::Slp,
        KpiPart::Crla,
        KpiPart::Philiri,
        KpiPart::Rma,
        KpiPart::Supervision,
        KpiPart::Adm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiPart::Implementation => "implementation",
            KpiPart::Slp => "slp",
            KpiPart::Crla => "crla",
            KpiPart::Philiri => "philiri",
            KpiPart::Rma => "rma",
            KpiPart::Supervision => "supervision",
            KpiPart::Adm => "adm",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KpiPart::Implementation => "% Implementation",
            KpiPart::Slp => "SLP (School Level Proficiency)",
            KpiPart::Crla => "Reading CRLA",
            KpiPart::Philiri => "Reading PHILIRI",
            KpiPart::Rma => "RMA (Reading & Math Assessment)",
            KpiPart::Supervision => "Instructional Supervision & TA",
            KpiPart::Adm => "ADM One-Stop-Shop & EiE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// Dashboard filter as received from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KpiFilter {
    pub school_year: i64,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub district_id: Option<i64>,
    #[serde(default)]
    pub school_id: Option<i64>,
    #[serde(default)]
    pub assessment_period: Option<String>,
    #[serde(default)]
    pub section_code: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub grade_range: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl KpiFilter {
    pub fn assessment_period(&self) -> &str {
        non_empty(&self.assessment_period).unwrap_or(DEFAULT_ASSESSMENT_PERIOD)
    }

    pub fn cache_key(&self, part: KpiPart) -> String {
        format!(
            "{}|sy={}|q={}|d={:?}|s={:?}|ap={}|sec={}|sub={}|g={}|gr={}",
            part.as_str(),
            self.school_year,
            non_empty(&self.quarter).unwrap_or(""),
            self.district_id,
            self.school_id,
            self.assessment_period(),
            non_empty(&self.section_code).unwrap_or(""),
            non_empty(&self.subject).unwrap_or(""),
            non_empty(&self.grade).unwrap_or(""),
            non_empty(&self.grade_range).unwrap_or(""),
        )
    }
}

#[derive(Debug, Clone, FromRow)]
struct CompletedSubmission {
    submission_id: i64,
    school_id: i64,
    school_name: String,
    district_name: Option<String>,
}

/// Which completed submissions feed a computation.
#[derive(Debug, Clone, Default)]
pub struct DatasetCriteria {
    pub school_year: Option<i64>,
    pub quarter: Option<String>,
    pub period_id: Option<i64>,
    pub district_id: Option<i64>,
    pub school_id: Option<i64>,
    pub section_code: Option<String>,
}

impl From<&KpiFilter> for DatasetCriteria {
    fn from(filter: &KpiFilter) -> Self {
        Self {
            school_year: Some(filter.school_year),
            quarter: non_empty(&filter.quarter).map(str::to_uppercase),
            period_id: None,
            district_id: filter.district_id,
            school_id: filter.school_id,
            section_code: non_empty(&filter.section_code).map(str::to_string),
        }
    }
}

/// Completed submissions in scope together with all of their form rows.
#[derive(Debug, Default)]
pub struct KpiDataset {
    submissions: Vec<CompletedSubmission>,
    pub pct: Vec<PctRow>,
    pub slp: Vec<SlpRow>,
    pub crla: Vec<CrlaRow>,
    pub philiri: Vec<PhiliriRow>,
    pub rma: Vec<RmaRow>,
    pub supervision: Vec<SupervisionRow>,
    pub adm_headers: Vec<AdmHeader>,
    pub adm: Vec<AdmRow>,
}

const ROWS_FOR_CHUNK: usize = 500;

pub(crate) async fn rows_for<T>(pool: &SqlitePool, table: &str, submission_ids: &[i64]) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::new();
    // SQLite caps the number of bound parameters per statement.
    for chunk in submission_ids.chunks(ROWS_FOR_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT * FROM {} WHERE submission_id IN (", table));
        let mut ids = builder.separated(", ");
        for id in chunk {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
        rows.extend(builder.build_query_as::<T>().fetch_all(pool).await?);
    }
    Ok(rows)
}

impl KpiDataset {
    pub async fn load(pool: &SqlitePool, criteria: &DatasetCriteria, scope: &SchoolScope) -> Result<Self> {
        let submissions: Vec<CompletedSubmission> = sqlx::query_as::<_, CompletedSubmission>(
            r#"
            SELECT s.id AS submission_id, s.school_id, sc.name AS school_name,
                   d.name AS district_name
            FROM submissions s
            JOIN schools sc ON sc.id = s.school_id
            LEFT JOIN districts d ON d.id = sc.district_id
            JOIN periods p ON p.id = s.period_id
            JOIN form_templates t ON t.id = s.form_template_id
            JOIN sections sec ON sec.id = t.section_id
            WHERE s.status IN ('submitted', 'noted')
              AND (? IS NULL OR p.school_year_start = ?)
              AND (? IS NULL OR p.quarter_tag = ?)
              AND (? IS NULL OR s.period_id = ?)
              AND (? IS NULL OR sc.district_id = ?)
              AND (? IS NULL OR s.school_id = ?)
              AND (? IS NULL OR lower(sec.code) = lower(?))
            ORDER BY sc.name, s.id
            "#,
        )
        .bind(criteria.school_year)
        .bind(criteria.school_year)
        .bind(&criteria.quarter)
        .bind(&criteria.quarter)
        .bind(criteria.period_id)
        .bind(criteria.period_id)
        .bind(criteria.district_id)
        .bind(criteria.district_id)
        .bind(criteria.school_id)
        .bind(criteria.school_id)
        .bind(&criteria.section_code)
        .bind(&criteria.section_code)
        .fetch_all(pool)
        .await?
        .into_iter()
        .filter(|s| scope.contains(s.school_id))
        .collect();

        let ids: Vec<i64> = submissions.iter().map(|s| s.submission_id).collect();
        debug!("KPI dataset: {} completed submission(s)", ids.len());

        Ok(Self {
            pct: rows_for(pool, "pct_rows", &ids).await?,
            slp: rows_for(pool, "slp_rows", &ids).await?,
            crla: rows_for(pool, "crla_rows", &ids).await?,
            philiri: rows_for(pool, "philiri_rows", &ids).await?,
            rma: rows_for(pool, "rma_rows", &ids).await?,
            supervision: rows_for(pool, "supervision_rows", &ids).await?,
            adm_headers: rows_for(pool, "adm_headers", &ids).await?,
            adm: rows_for(pool, "adm_rows", &ids).await?,
            submissions,
        })
    }

    /// Schools with at least one completed submission, ordered by name.
    pub fn schools(&self) -> Vec<SchoolRef> {
        let mut seen = HashSet::new();
        let mut schools: Vec<SchoolRef> = self
            .submissions
            .iter()
            .filter(|s| seen.insert(s.school_id))
            .map(|s| SchoolRef {
                school_id: s.school_id,
                school_name: s.school_name.clone(),
                district_name: s
                    .district_name
                    .clone()
                    .unwrap_or_else(|| "Unassigned".to_string()),
            })
            .collect();
        schools.sort_by(|a, b| a.school_name.cmp(&b.school_name).then(a.school_id.cmp(&b.school_id)));
        schools
    }

    fn submission_ids_of(&self, school_id: i64) -> HashSet<i64> {
        self.submissions
            .iter()
            .filter(|s| s.school_id == school_id)
            .map(|s| s.submission_id)
            .collect()
    }

    /// Distinct schools owning at least one of the given submissions.
    fn school_count(&self, submission_ids: impl IntoIterator<Item = i64>) -> usize {
        let ids: HashSet<i64> = submission_ids.into_iter().collect();
        self.submissions
            .iter()
            .filter(|s| ids.contains(&s.submission_id))
            .map(|s| s.school_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn part_for_school(&self, part: KpiPart, school_id: i64, filter: &KpiFilter) -> PartKpi {
        let ids = self.submission_ids_of(school_id);
        let mine = |submission_id: &i64| ids.contains(submission_id);
        let period = filter.assessment_period();
        match part {
            KpiPart::Implementation => PartKpi::Implementation(kpi::implementation(
                self.pct.iter().filter(|r| mine(&r.submission_id)),
            )),
            KpiPart::Slp => PartKpi::Slp(kpi::slp(
                self.slp.iter().filter(|r| mine(&r.submission_id)),
                non_empty(&filter.subject),
                non_empty(&filter.grade),
            )),
            KpiPart::Crla => PartKpi::Crla(kpi::crla(
                self.crla.iter().filter(|r| mine(&r.submission_id)),
                period,
                non_empty(&filter.subject),
            )),
            KpiPart::Philiri => PartKpi::Philiri(kpi::philiri(
                self.philiri.iter().filter(|r| mine(&r.submission_id)),
                period,
                non_empty(&filter.subject),
                non_empty(&filter.grade_range),
            )),
            KpiPart::Rma => PartKpi::Rma(kpi::rma(
                self.rma.iter().filter(|r| mine(&r.submission_id)),
                non_empty(&filter.grade),
            )),
            KpiPart::Supervision => PartKpi::Supervision(kpi::supervision(
                self.supervision.iter().filter(|r| mine(&r.submission_id)),
            )),
            KpiPart::Adm => PartKpi::Adm(kpi::adm(
                self.adm_headers.iter().filter(|h| mine(&h.submission_id)),
                self.adm.iter().filter(|r| mine(&r.submission_id)),
            )),
        }
    }

    pub fn period_kpis(&self, assessment_period: &str) -> PeriodKpis {
        let offered_slp = self.slp.iter().filter(|r| r.is_offered);
        let implementation = kpi::implementation(&self.pct);
        let adm_offering: Vec<i64> = self
            .adm_headers
            .iter()
            .filter(|h| h.is_offered)
            .map(|h| h.submission_id)
            .collect();
        let crla_rows = self.crla.iter().filter(|r| r.period == assessment_period);
        let philiri_rows = self.philiri.iter().filter(|r| r.period == assessment_period);

        PeriodKpis {
            slp: Counted {
                kpi: kpi::slp(&self.slp, None, None),
                total_schools: self.school_count(offered_slp.map(|r| r.submission_id)),
            },
            implementation: ImplementationSummary {
                overall_average: implementation.overall_average(),
                kpi: implementation,
                total_schools: self.school_count(self.pct.iter().map(|r| r.submission_id)),
            },
            crla: Counted {
                kpi: kpi::crla(&self.crla, assessment_period, None),
                total_schools: self.school_count(crla_rows.map(|r| r.submission_id)),
            },
            philiri: Counted {
                kpi: kpi::philiri(&self.philiri, assessment_period, None, None),
                total_schools: self.school_count(philiri_rows.map(|r| r.submission_id)),
            },
            rma: Counted {
                kpi: kpi::rma(&self.rma, None),
                total_schools: self.school_count(self.rma.iter().map(|r| r.submission_id)),
            },
            supervision: Counted {
                kpi: kpi::supervision(&self.supervision),
                total_schools: self
                    .school_count(self.supervision.iter().map(|r| r.submission_id)),
            },
            adm: AdmSummary {
                kpi: kpi::adm(&self.adm_headers, &self.adm),
                schools_offering_adm: self.school_count(adm_offering),
                total_schools: self.school_count(self.adm.iter().map(|r| r.submission_id)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolRef {
    pub school_id: i64,
    pub school_name: String,
    pub district_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PartKpi {
    Implementation(ImplementationKpi),
    Slp(SlpKpi),
    Crla(CrlaKpi),
    Philiri(PhiliriKpi),
    Rma(RmaKpi),
    Supervision(SupervisionKpi),
    Adm(AdmKpi),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolKpiRow {
    #[serde(flatten)]
    pub school: SchoolRef,
    #[serde(flatten)]
    pub kpi: PartKpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Counted<T: Serialize> {
    #[serde(flatten)]
    pub kpi: T,
    pub total_schools: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImplementationSummary {
    #[serde(flatten)]
    pub kpi: ImplementationKpi,
    pub overall_average: f64,
    pub total_schools: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdmSummary {
    #[serde(flatten)]
    pub kpi: AdmKpi,
    pub schools_offering_adm: usize,
    pub total_schools: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodKpis {
    pub slp: Counted<SlpKpi>,
    pub implementation: ImplementationSummary,
    pub crla: Counted<CrlaKpi>,
    pub philiri: Counted<PhiliriKpi>,
    pub rma: Counted<RmaKpi>,
    pub supervision: Counted<SupervisionKpi>,
    pub adm: AdmSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterKpis {
    pub period_id: i64,
    pub period_label: String,
    #[serde(flatten)]
    pub kpis: PeriodKpis,
}

/// One row per school with completed submissions matching the filter.
pub async fn school_kpis(
    pool: &SqlitePool,
    scope: &SchoolScope,
    part: KpiPart,
    filter: &KpiFilter,
) -> Result<Vec<SchoolKpiRow>> {
    let dataset = KpiDataset::load(pool, &DatasetCriteria::from(filter), scope).await?;
    Ok(dataset
        .schools()
        .into_iter()
        .map(|school| SchoolKpiRow {
            kpi: dataset.part_for_school(part, school.school_id, filter),
            school,
        })
        .collect())
}

/// Division-level KPIs for one period.
pub async fn kpis_for_period(
    pool: &SqlitePool,
    scope: &SchoolScope,
    period_id: i64,
    section_code: Option<&str>,
    assessment_period: Option<&str>,
) -> Result<PeriodKpis> {
    Queries::get_period(pool, period_id).await?;
    let criteria = DatasetCriteria {
        period_id: Some(period_id),
        section_code: Some(section_code.unwrap_or(DEFAULT_SECTION_CODE).to_string()),
        ..Default::default()
    };
    let dataset = KpiDataset::load(pool, &criteria, scope).await?;
    Ok(dataset.period_kpis(assessment_period.unwrap_or(DEFAULT_ASSESSMENT_PERIOD)))
}

/// Period KPIs for the active Q1..Q4 periods of a school year.
pub async fn kpis_for_quarters(
    pool: &SqlitePool,
    scope: &SchoolScope,
    school_year: i64,
    section_code: Option<&str>,
    assessment_period: Option<&str>,
) -> Result<Vec<QuarterKpis>> {
    let mut periods: Vec<Period> = Queries::list_periods(pool)
        .await?
        .into_iter()
        .filter(|p| p.is_active && p.school_year_start == school_year)
        .filter(|p| matches!(p.quarter_tag.as_str(), "Q1" | "Q2" | "Q3" | "Q4"))
        .collect();
    if periods.is_empty() {
        return Err(ReportsError::not_found(format!(
            "no active quarters for SY {}-{}",
            school_year,
            school_year + 1
        )));
    }
    periods.sort_by_key(|p| p.display_order);

    let mut quarters = Vec::with_capacity(periods.len());
    for period in periods {
        let kpis = kpis_for_period(pool, scope, period.id, section_code, assessment_period).await?;
        let period_label = if period.quarter_tag.is_empty() {
            period.label.clone()
        } else {
            period.quarter_tag.clone()
        };
        quarters.push(QuarterKpis {
            period_id: period.id,
            period_label,
            kpis,
        });
    }
    Ok(quarters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_names_round_trip_case_insensitively() {
        assert_eq!(KpiPart::from_str("SLP"), Some(KpiPart::Slp));
        assert_eq!(KpiPart::from_str(" adm "), Some(KpiPart::Adm));
        assert_eq!(KpiPart::from_str("reading"), None);
    }

    #[test]
    fn test_cache_key_distinguishes_filters() {
        let base = KpiFilter {
            school_year: 2025,
            ..Default::default()
        };
        let mut q1 = base.clone();
        q1.quarter = Some("Q1".to_string());
        assert_ne!(base.cache_key(KpiPart::Slp), q1.cache_key(KpiPart::Slp));
        assert_ne!(base.cache_key(KpiPart::Slp), base.cache_key(KpiPart::Rma));
        assert_eq!(base.assessment_period(), "bosy");
    }

    #[tokio::test]
    async fn test_rows_for_handles_more_ids_than_sqlite_binds() {
        let db = crate::database::Database::new_in_memory().await.unwrap();
        let pool = db.pool();
        sqlx::query("PRAGMA foreign_keys = OFF").execute(pool).await.unwrap();
        for id in [1_i64, 40_000, 70_000] {
            sqlx::query("INSERT INTO adm_headers (submission_id, is_offered) VALUES (?, 1)")
                .bind(id)
                .execute(pool)
                .await
                .unwrap();
        }

        let ids: Vec<i64> = (1..=70_000).collect();
        let headers: Vec<AdmHeader> = rows_for(pool, "adm_headers", &ids).await.unwrap();
        let mut found: Vec<i64> = headers.iter().map(|h| h.submission_id).collect();
        found.sort_unstable();
        assert_eq!(found, vec![1, 40_000, 70_000]);

        let none: Vec<AdmHeader> = rows_for(pool, "adm_headers", &[]).await.unwrap();
        assert!(none.is_empty());
    }
}
