//! KPI arithmetic over form rows. Everything here is pure; callers decide
//! which rows (completed submissions, scope, filters) go in.

use serde::Serialize;

use crate::database::models::{AdmHeader, AdmRow, CrlaRow, PctRow, PhiliriRow, RmaRow, SlpRow, SupervisionRow};

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `part / total` as a percentage with one decimal; 0 when `total` is 0.
pub fn percent(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(part as f64 / total as f64 * 100.0, 1)
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImplementationKpi {
    pub access_percent: f64,
    pub quality_percent: f64,
    pub equity_percent: f64,
    pub enabling_percent: f64,
}

impl ImplementationKpi {
    pub fn overall_average(&self) -> f64 {
        round_to(
            (self.access_percent + self.quality_percent + self.equity_percent + self.enabling_percent)
                / 4.0,
            1,
        )
    }
}

/// Average `percent` per area; rows without a percent are ignored.
pub fn implementation<'a>(rows: impl IntoIterator<Item = &'a PctRow> + Clone) -> ImplementationKpi {
    let area_avg = |area: &str| {
        let values = rows
            .clone()
            .into_iter()
            .filter(|r| r.area == area)
            .filter_map(|r| r.percent.map(|p| p as f64));
        round_to(mean(values).unwrap_or(0.0), 1)
    };
    ImplementationKpi {
        access_percent: area_avg("access"),
        quality_percent: area_avg("quality"),
        equity_percent: area_avg("equity"),
        enabling_percent: area_avg("enabling_mechanisms"),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SlpKpi {
    pub total_enrollment: i64,
    pub dnme_percent: f64,
    pub fs_percent: f64,
    pub s_percent: f64,
    pub vs_percent: f64,
    pub o_percent: f64,
}

/// Proficiency bands over enrolment for offered rows.
pub fn slp<'a>(
    rows: impl IntoIterator<Item = &'a SlpRow>,
    subject: Option<&str>,
    grade: Option<&str>,
) -> SlpKpi {
    let mut totals = [0i64; 6];
    for row in rows.into_iter().filter(|r| r.is_offered) {
        if subject.is_some_and(|s| row.subject != s) || grade.is_some_and(|g| row.grade_label != g) {
            continue;
        }
        for (total, value) in totals
            .iter_mut()
            .zip([row.enrolment, row.dnme, row.fs, row.s, row.vs, row.o])
        {
            *total += value;
        }
    }
    let [enrolment, dnme, fs, s, vs, o] = totals;
    SlpKpi {
        total_enrollment: enrolment,
        dnme_percent: percent(dnme, enrolment),
        fs_percent: percent(fs, enrolment),
        s_percent: percent(s, enrolment),
        vs_percent: percent(vs, enrolment),
        o_percent: percent(o, enrolment),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CrlaKpi {
    pub total_learners: i64,
    pub low_emerging_percent: f64,
    pub high_emerging_percent: f64,
    pub developing_percent: f64,
    pub transitioning_percent: f64,
}

fn crla_learners(row: &CrlaRow, subject: Option<&str>) -> i64 {
    let mt = row.mt_grade_1 + row.mt_grade_2 + row.mt_grade_3;
    let fil = row.fil_grade_2 + row.fil_grade_3;
    let eng = row.eng_grade_3;
    match subject {
        Some("mt") => mt,
        Some("fil") => fil,
        Some("eng") => eng,
        _ => mt + fil + eng,
    }
}

/// Share of each CRLA level among learners assessed in `assessment_period`.
pub fn crla<'a>(
    rows: impl IntoIterator<Item = &'a CrlaRow>,
    assessment_period: &str,
    subject: Option<&str>,
) -> CrlaKpi {
    let mut by_level = [0i64; 4];
    for row in rows.into_iter().filter(|r| r.period == assessment_period) {
        let index = match row.level.as_str() {
            "low_emerging" => 0,
            "high_emerging" => 1,
            "developing" => 2,
            "transitioning" => 3,
            _ => continue,
        };
        by_level[index] += crla_learners(row, subject);
    }
    let total: i64 = by_level.iter().sum();
    CrlaKpi {
        total_learners: total,
        low_emerging_percent: percent(by_level[0], total),
        high_emerging_percent: percent(by_level[1], total),
        developing_percent: percent(by_level[2], total),
        transitioning_percent: percent(by_level[3], total),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhiliriKpi {
    pub total_learners: i64,
    pub frustration_percent: f64,
    pub instructional_percent: f64,
    pub independent_percent: f64,
}

/// Grades 4..=10 kept by a grade-range filter.
fn philiri_grade_kept(grade: i64, grade_range: Option<&str>) -> bool {
    match grade_range {
        Some("elementary") => (4..=6).contains(&grade),
        Some("junior") => (7..=10).contains(&grade),
        _ => true,
    }
}

fn philiri_learners(row: &PhiliriRow, subject: Option<&str>, grade_range: Option<&str>) -> i64 {
    let sum = |counts: [i64; 7]| -> i64 {
        counts
            .iter()
            .zip(4i64..)
            .filter(|(_, grade)| philiri_grade_kept(*grade, grade_range))
            .map(|(count, _)| *count)
            .sum()
    };
    match subject {
        Some("eng") => sum(row.eng_counts()),
        Some("fil") => sum(row.fil_counts()),
        _ => sum(row.eng_counts()) + sum(row.fil_counts()),
    }
}

pub fn philiri<'a>(
    rows: impl IntoIterator<Item = &'a PhiliriRow>,
    assessment_period: &str,
    subject: Option<&str>,
    grade_range: Option<&str>,
) -> PhiliriKpi {
    let mut by_level = [0i64; 3];
    for row in rows.into_iter().filter(|r| r.period == assessment_period) {
        let index = match row.level.as_str() {
            "frustration" => 0,
            "instructional" => 1,
            "independent" => 2,
            _ => continue,
        };
        by_level[index] += philiri_learners(row, subject, grade_range);
    }
    let total: i64 = by_level.iter().sum();
    PhiliriKpi {
        total_learners: total,
        frustration_percent: percent(by_level[0], total),
        instructional_percent: percent(by_level[1], total),
        independent_percent: percent(by_level[2], total),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RmaKpi {
    pub total_enrollment: i64,
    pub not_proficient_percent: f64,
    pub low_proficient_percent: f64,
    pub nearly_proficient_percent: f64,
    pub proficient_percent: f64,
    pub at_grade_level_percent: f64,
}

pub fn rma<'a>(rows: impl IntoIterator<Item = &'a RmaRow>, grade: Option<&str>) -> RmaKpi {
    let mut totals = [0i64; 6];
    for row in rows {
        if grade.is_some_and(|g| row.grade_label != g) {
            continue;
        }
        for (total, value) in totals.iter_mut().zip([
            row.enrolment,
            row.emerging_not_proficient,
            row.emerging_low_proficient,
            row.developing_nearly_proficient,
            row.transitioning_proficient,
            row.at_grade_level,
        ]) {
            *total += value;
        }
    }
    let [enrolment, not_proficient, low, nearly, proficient, at_grade] = totals;
    RmaKpi {
        total_enrollment: enrolment,
        not_proficient_percent: percent(not_proficient, enrolment),
        low_proficient_percent: percent(low, enrolment),
        nearly_proficient_percent: percent(nearly, enrolment),
        proficient_percent: percent(proficient, enrolment),
        at_grade_level_percent: percent(at_grade, enrolment),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SupervisionKpi {
    pub teachers_supervised_count: i64,
    pub supervision_entries: i64,
    pub completion_rate: f64,
}

/// An entry counts as complete when both intervention and result are filled.
pub fn supervision<'a>(rows: impl IntoIterator<Item = &'a SupervisionRow>) -> SupervisionKpi {
    let mut kpi = SupervisionKpi::default();
    let mut completed = 0;
    for row in rows {
        kpi.teachers_supervised_count += row.teachers_supervised_observed_ta;
        kpi.supervision_entries += 1;
        if !row.intervention_support_provided.trim().is_empty() && !row.result.trim().is_empty() {
            completed += 1;
        }
    }
    kpi.completion_rate = percent(completed, kpi.supervision_entries);
    kpi
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AdmKpi {
    pub adm_offered: bool,
    pub adm_entries: i64,
    pub physical_accomplishment_percent: f64,
    pub fund_utilization_percent: f64,
    pub overall_adm_percent: f64,
}

/// ADM averages. Without any offering header everything is zero.
pub fn adm<'a>(
    headers: impl IntoIterator<Item = &'a AdmHeader>,
    rows: impl IntoIterator<Item = &'a AdmRow> + Clone,
) -> AdmKpi {
    if !headers.into_iter().any(|h| h.is_offered) {
        return AdmKpi::default();
    }
    let physical = round_to(
        mean(rows.clone().into_iter().map(|r| r.ppas_physical_percent)).unwrap_or(0.0),
        1,
    );
    let funds = round_to(
        mean(rows.clone().into_iter().map(|r| r.funds_percent_obligated)).unwrap_or(0.0),
        1,
    );
    let overall = if physical != 0.0 || funds != 0.0 {
        round_to((physical + funds) / 2.0, 1)
    } else {
        0.0
    };
    AdmKpi {
        adm_offered: true,
        adm_entries: rows.into_iter().count() as i64,
        physical_accomplishment_percent: physical,
        fund_utilization_percent: funds,
        overall_adm_percent: overall,
    }
}
