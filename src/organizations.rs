//! Schools, districts and grade-span helpers

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use sqlx::SqlitePool;

use crate::database::models::{District, School, SchoolProfile};
use crate::database::queries::Queries;
use crate::error::Result;

fn grade_digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Parse a grade label ("Grade 7", "G7", "g10", "Kinder", "k") into a grade
/// number. Kindergarten is grade 0.
pub fn extract_grade_number(label: &str) -> Option<i64> {
    let lower = label.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("kinder") || lower.starts_with('k') {
        return Some(0);
    }
    grade_digits()
        .find(&lower)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Resolved grade span: the profile span when both ends are set, else the
/// school's min/max grade.
pub fn grade_span(school: &School, profile: Option<&SchoolProfile>) -> Option<(i64, i64)> {
    if let Some(profile) = profile {
        if let (Some(start), Some(end)) = (profile.grade_span_start, profile.grade_span_end) {
            return Some((start, end));
        }
    }
    match (school.min_grade, school.max_grade) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    }
}

pub fn grade_span_label(school: &School, profile: Option<&SchoolProfile>) -> String {
    match grade_span(school, profile) {
        Some((start, end)) => format!("G{}-G{}", start, end),
        None => String::new(),
    }
}

pub fn grade_numbers(school: &School, profile: Option<&SchoolProfile>) -> Vec<i64> {
    match grade_span(school, profile) {
        Some((start, end)) if start <= end => (start..=end).collect(),
        _ => Vec::new(),
    }
}

/// True when any label parses to a grade outside the school's span.
pub fn has_grade_span_mismatch<'a>(
    school: &School,
    profile: Option<&SchoolProfile>,
    labels: impl IntoIterator<Item = &'a str>,
) -> bool {
    let Some((start, end)) = grade_span(school, profile) else {
        return false;
    };
    labels
        .into_iter()
        .filter_map(extract_grade_number)
        .any(|grade| grade < start || grade > end)
}

/// In-memory snapshot of the organization tables used by dashboards.
pub struct Directory {
    pub schools: Vec<School>,
    pub districts: HashMap<i64, District>,
    pub profiles: HashMap<i64, SchoolProfile>,
}

impl Directory {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let schools = Queries::list_schools(pool).await?;
        let districts = Queries::list_districts(pool)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();
        let profiles = Queries::list_school_profiles(pool)
            .await?
            .into_iter()
            .map(|p| (p.school_id, p))
            .collect();
        Ok(Self {
            schools,
            districts,
            profiles,
        })
    }

    pub fn school(&self, school_id: i64) -> Option<&School> {
        self.schools.iter().find(|s| s.id == school_id)
    }

    pub fn profile(&self, school_id: i64) -> Option<&SchoolProfile> {
        self.profiles.get(&school_id)
    }

    pub fn district_name(&self, district_id: Option<i64>) -> Option<&str> {
        district_id
            .and_then(|id| self.districts.get(&id))
            .map(|d| d.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn school(min: Option<i64>, max: Option<i64>) -> School {
        School {
            id: 1,
            code: "100001".to_string(),
            name: "Sample ES".to_string(),
            division: "Sample Division".to_string(),
            district_id: None,
            school_type: "elementary".to_string(),
            min_grade: min,
            max_grade: max,
            implements_adm: false,
        }
    }

    fn profile(start: Option<i64>, end: Option<i64>) -> SchoolProfile {
        SchoolProfile {
            school_id: 1,
            head_name: String::new(),
            head_contact: String::new(),
            grade_span_start: start,
            grade_span_end: end,
            strands: Vec::new(),
            notification_email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_extract_grade_number() {
        assert_eq!(extract_grade_number("Grade 7"), Some(7));
        assert_eq!(extract_grade_number("G7"), Some(7));
        assert_eq!(extract_grade_number("g10"), Some(10));
        assert_eq!(extract_grade_number("Kinder"), Some(0));
        assert_eq!(extract_grade_number("k"), Some(0));
        assert_eq!(extract_grade_number("SHS"), None);
        assert_eq!(extract_grade_number(""), None);
    }

    #[test]
    fn test_profile_span_wins_over_school_span() {
        let s = school(Some(0), Some(6));
        let p = profile(Some(7), Some(10));
        assert_eq!(grade_span_label(&s, Some(&p)), "G7-G10");
        assert_eq!(grade_numbers(&s, Some(&p)), vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_partial_profile_span_falls_back() {
        let s = school(Some(1), Some(3));
        let p = profile(Some(7), None);
        assert_eq!(grade_span_label(&s, Some(&p)), "G1-G3");
        assert_eq!(grade_span_label(&school(None, None), None), "");
        assert!(grade_numbers(&school(None, Some(6)), None).is_empty());
    }

    #[test]
    fn test_grade_span_mismatch() {
        let s = school(Some(1), Some(6));
        assert!(!has_grade_span_mismatch(&s, None, ["Grade 1", "g6", "SHS"]));
        assert!(has_grade_span_mismatch(&s, None, ["Grade 7"]));
        assert!(!has_grade_span_mismatch(&school(None, None), None, ["Grade 12"]));
    }
}
