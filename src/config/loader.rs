//! Division seed loader
//! Loads a YAML description of districts, sections, schools, periods, form
//! templates and users, validates it and upserts it into the database.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{ReportsError, Result};
use crate::submissions::templates::PERIOD_TYPES;

const QUARTER_TAGS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistrictSeed {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectionSeed {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfileSeed {
    #[serde(default)]
    pub head_name: String,
    #[serde(default)]
    pub head_contact: String,
    #[serde(default)]
    pub grade_span_start: Option<i64>,
    #[serde(default)]
    pub grade_span_end: Option<i64>,
    #[serde(default)]
    pub strands: Vec<String>,
    #[serde(default)]
    pub notification_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchoolSeed {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub division: String,
    /// District code.
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub school_type: String,
    #[serde(default)]
    pub min_grade: Option<i64>,
    #[serde(default)]
    pub max_grade: Option<i64>,
    #[serde(default)]
    pub implements_adm: bool,
    #[serde(default)]
    pub profile: Option<ProfileSeed>,
}

fn default_true() -> bool {
    true
}

fn default_period_type() -> String {
    "quarter".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeriodSeed {
    pub label: String,
    pub school_year_start: i64,
    pub quarter_tag: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormTemplateSeed {
    pub code: String,
    /// Section code.
    pub section: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_period_type")]
    pub period_type: String,
    pub open_at: NaiveDate,
    pub close_at: NaiveDate,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub school_year: Option<i64>,
    #[serde(default)]
    pub quarter_filter: String,
    #[serde(default)]
    pub reading_timing_override: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserSeed {
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// School code for school heads.
    #[serde(default)]
    pub school: Option<String>,
    /// District codes for PSDS accounts.
    #[serde(default)]
    pub districts: Vec<String>,
    #[serde(default)]
    pub sgod_admin: bool,
    #[serde(default)]
    pub section_admin: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DivisionSeed {
    #[serde(default)]
    pub districts: Vec<DistrictSeed>,
    #[serde(default)]
    pub sections: Vec<SectionSeed>,
    #[serde(default)]
    pub schools: Vec<SchoolSeed>,
    #[serde(default)]
    pub periods: Vec<PeriodSeed>,
    #[serde(default)]
    pub form_templates: Vec<FormTemplateSeed>,
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

/// Rows written by [`DivisionSeed::apply`], per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub districts: usize,
    pub sections: usize,
    pub schools: usize,
    pub profiles: usize,
    pub periods: usize,
    pub form_templates: usize,
    pub users: usize,
}

/// Records blank and repeated codes of one collection.
fn check_codes<'a>(
    kind: &str,
    codes: impl IntoIterator<Item = &'a str>,
    errors: &mut Vec<String>,
) -> HashSet<String> {
    let mut seen = HashSet::new();
    for code in codes {
        let code = code.trim();
        if code.is_empty() {
            errors.push(format!("{}: code must not be empty", kind));
        } else if !seen.insert(code.to_lowercase()) {
            errors.push(format!("{}: duplicate code '{}'", kind, code));
        }
    }
    seen
}

impl DivisionSeed {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading division seed from: {:?}", path);
        if !path.exists() {
            return Err(ReportsError::Config(format!("Seed file not found: {:?}", path)));
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| ReportsError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        Self::from_yaml(&contents)
            .map_err(|e| ReportsError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Check the seed for internal consistency, reporting every problem.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let districts = check_codes(
            "districts",
            self.districts.iter().map(|d| d.code.as_str()),
            &mut errors,
        );
        let sections = check_codes(
            "sections",
            self.sections.iter().map(|s| s.code.as_str()),
            &mut errors,
        );
        let schools = check_codes(
            "schools",
            self.schools.iter().map(|s| s.code.as_str()),
            &mut errors,
        );
        check_codes(
            "form_templates",
            self.form_templates.iter().map(|t| t.code.as_str()),
            &mut errors,
        );
        check_codes(
            "users",
            self.users.iter().map(|u| u.username.as_str()),
            &mut errors,
        );

        self.validate_schools(&districts, &mut errors);
        self.validate_periods(&mut errors);
        self.validate_form_templates(&sections, &mut errors);
        self.validate_users(&districts, &sections, &schools, &mut errors);

        if errors.is_empty() {
            debug!("Division seed is valid");
            Ok(())
        } else {
            Err(ReportsError::Validation(errors))
        }
    }

    fn validate_schools(&self, districts: &HashSet<String>, errors: &mut Vec<String>) {
        for school in &self.schools {
            if school.name.trim().is_empty() {
                errors.push(format!("School {}: name must not be empty", school.code));
            }
            if let Some(district) = &school.district {
                if !districts.contains(&district.trim().to_lowercase()) {
                    errors.push(format!(
                        "School {}: unknown district '{}'",
                        school.code, district
                    ));
                }
            }
            if let (Some(min), Some(max)) = (school.min_grade, school.max_grade) {
                if min > max {
                    errors.push(format!(
                        "School {}: min_grade ({}) > max_grade ({})",
                        school.code, min, max
                    ));
                }
            }
            if let Some(profile) = &school.profile {
                if let (Some(start), Some(end)) = (profile.grade_span_start, profile.grade_span_end) {
                    if start > end {
                        errors.push(format!(
                            "School {}: grade_span_start ({}) > grade_span_end ({})",
                            school.code, start, end
                        ));
                    }
                }
            }
        }
    }

    fn validate_periods(&self, errors: &mut Vec<String>) {
        let mut seen = HashSet::new();
        for period in &self.periods {
            if period.label.trim().is_empty() {
                errors.push("periods: label must not be empty".to_string());
            }
            if !QUARTER_TAGS.contains(&period.quarter_tag.as_str()) {
                errors.push(format!(
                    "Period {}: quarter_tag '{}' must be one of Q1..Q4",
                    period.label, period.quarter_tag
                ));
            }
            if !seen.insert((period.school_year_start, period.quarter_tag.clone())) {
                errors.push(format!(
                    "Period {}: duplicate {} for SY {}",
                    period.label, period.quarter_tag, period.school_year_start
                ));
            }
        }
    }

    fn validate_form_templates(&self, sections: &HashSet<String>, errors: &mut Vec<String>) {
        for template in &self.form_templates {
            if !sections.contains(&template.section.trim().to_lowercase()) {
                errors.push(format!(
                    "Form template {}: unknown section '{}'",
                    template.code, template.section
                ));
            }
            if template.open_at > template.close_at {
                errors.push(format!(
                    "Form template {}: open_at ({}) is after close_at ({})",
                    template.code, template.open_at, template.close_at
                ));
            }
            if !PERIOD_TYPES.contains(&template.period_type.as_str()) {
                errors.push(format!(
                    "Form template {}: unknown period type '{}'",
                    template.code, template.period_type
                ));
            }
            if !template.quarter_filter.is_empty()
                && !QUARTER_TAGS.contains(&template.quarter_filter.as_str())
            {
                errors.push(format!(
                    "Form template {}: quarter_filter '{}' must be one of Q1..Q4",
                    template.code, template.quarter_filter
                ));
            }
        }
    }

    fn validate_users(
        &self,
        districts: &HashSet<String>,
        sections: &HashSet<String>,
        schools: &HashSet<String>,
        errors: &mut Vec<String>,
    ) {
        for user in &self.users {
            if let Some(school) = &user.school {
                if !schools.contains(&school.trim().to_lowercase()) {
                    errors.push(format!("User {}: unknown school '{}'", user.username, school));
                }
            }
            for district in &user.districts {
                if !districts.contains(&district.trim().to_lowercase()) {
                    errors.push(format!(
                        "User {}: unknown district '{}'",
                        user.username, district
                    ));
                }
            }
            for section in &user.section_admin {
                if !sections.contains(&section.trim().to_lowercase()) {
                    errors.push(format!(
                        "User {}: unknown section '{}'",
                        user.username, section
                    ));
                }
            }
        }
    }

    /// Upsert everything in one transaction. Existing rows are matched by
    /// code (username for users) so applying the same seed twice is a no-op.
    pub async fn apply(&self, pool: &SqlitePool) -> Result<SeedReport> {
        self.validate()?;
        let mut tx = pool.begin().await?;
        let mut report = SeedReport::default();

        let mut district_ids = HashMap::new();
        for district in &self.districts {
            let id = upsert_by_code(&mut tx, "districts", &district.code, &district.name).await?;
            district_ids.insert(district.code.trim().to_lowercase(), id);
            report.districts += 1;
        }

        let mut section_ids = HashMap::new();
        for section in &self.sections {
            let id = upsert_by_code(&mut tx, "sections", &section.code, &section.name).await?;
            section_ids.insert(section.code.trim().to_lowercase(), id);
            report.sections += 1;
        }

        let mut school_ids = HashMap::new();
        for school in &self.schools {
            let district_id = school
                .district
                .as_ref()
                .and_then(|code| district_ids.get(&code.trim().to_lowercase()).copied());
            let id = upsert_school(&mut tx, school, district_id).await?;
            school_ids.insert(school.code.trim().to_lowercase(), id);
            report.schools += 1;
            if let Some(profile) = &school.profile {
                upsert_profile(&mut tx, id, profile).await?;
                report.profiles += 1;
            }
        }

        for period in &self.periods {
            sqlx::query(
                r#"
                INSERT INTO periods (label, school_year_start, quarter_tag, display_order, is_active)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (school_year_start, quarter_tag) DO UPDATE SET
                    label = excluded.label,
                    display_order = excluded.display_order,
                    is_active = excluded.is_active
                "#,
            )
            .bind(period.label.trim())
            .bind(period.school_year_start)
            .bind(&period.quarter_tag)
            .bind(period.display_order)
            .bind(period.is_active)
            .execute(&mut *tx)
            .await?;
            report.periods += 1;
        }

        for template in &self.form_templates {
            let section_id = section_ids
                .get(&template.section.trim().to_lowercase())
                .copied()
                .ok_or_else(|| ReportsError::not_found(format!("section '{}'", template.section)))?;
            upsert_template(&mut tx, template, section_id).await?;
            report.form_templates += 1;
        }

        for user in &self.users {
            let school_id = user
                .school
                .as_ref()
                .and_then(|code| school_ids.get(&code.trim().to_lowercase()).copied());
            let districts: Vec<i64> = user
                .districts
                .iter()
                .filter_map(|code| district_ids.get(&code.trim().to_lowercase()).copied())
                .collect();
            upsert_user(&mut tx, user, school_id, &districts).await?;
            report.users += 1;
        }

        tx.commit().await?;
        info!("Applied division seed: {:?}", report);
        Ok(report)
    }
}

async fn upsert_by_code(conn: &mut SqliteConnection, table: &str, code: &str, name: &str) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(&format!(
        "INSERT INTO {} (code, name) VALUES (?, ?) \
         ON CONFLICT (code) DO UPDATE SET name = excluded.name RETURNING id",
        table
    ))
    .bind(code.trim())
    .bind(name.trim())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

async fn upsert_school(conn: &mut SqliteConnection, school: &SchoolSeed, district_id: Option<i64>) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO schools
            (code, name, division, district_id, school_type, min_grade, max_grade, implements_adm)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (code) DO UPDATE SET
            name = excluded.name,
            division = excluded.division,
            district_id = excluded.district_id,
            school_type = excluded.school_type,
            min_grade = excluded.min_grade,
            max_grade = excluded.max_grade,
            implements_adm = excluded.implements_adm
        RETURNING id
        "#,
    )
    .bind(school.code.trim())
    .bind(school.name.trim())
    .bind(&school.division)
    .bind(district_id)
    .bind(&school.school_type)
    .bind(school.min_grade)
    .bind(school.max_grade)
    .bind(school.implements_adm)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

async fn upsert_profile(conn: &mut SqliteConnection, school_id: i64, profile: &ProfileSeed) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO school_profiles
            (school_id, head_name, head_contact, grade_span_start, grade_span_end, strands,
             notification_email, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (school_id) DO UPDATE SET
            head_name = excluded.head_name,
            head_contact = excluded.head_contact,
            grade_span_start = excluded.grade_span_start,
            grade_span_end = excluded.grade_span_end,
            strands = excluded.strands,
            notification_email = excluded.notification_email,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(school_id)
    .bind(profile.head_name.trim())
    .bind(profile.head_contact.trim())
    .bind(profile.grade_span_start)
    .bind(profile.grade_span_end)
    .bind(serde_json::to_string(&profile.strands)?)
    .bind(&profile.notification_email)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_template(conn: &mut SqliteConnection, template: &FormTemplateSeed, section_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO form_templates
            (section_id, code, title, version, period_type, open_at, close_at, is_active,
             school_year, quarter_filter, reading_timing_override)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (code) DO UPDATE SET
            section_id = excluded.section_id,
            title = excluded.title,
            version = excluded.version,
            period_type = excluded.period_type,
            open_at = excluded.open_at,
            close_at = excluded.close_at,
            is_active = excluded.is_active,
            school_year = excluded.school_year,
            quarter_filter = excluded.quarter_filter,
            reading_timing_override = excluded.reading_timing_override
        "#,
    )
    .bind(section_id)
    .bind(template.code.trim())
    .bind(template.title.trim())
    .bind(&template.version)
    .bind(&template.period_type)
    .bind(template.open_at)
    .bind(template.close_at)
    .bind(template.is_active)
    .bind(template.school_year)
    .bind(&template.quarter_filter)
    .bind(&template.reading_timing_override)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_user(
    conn: &mut SqliteConnection,
    user: &UserSeed,
    school_id: Option<i64>,
    district_ids: &[i64],
) -> Result<()> {
    let user_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO users (username, is_superuser, is_active) VALUES (?, ?, ?)
        ON CONFLICT (username) DO UPDATE SET
            is_superuser = excluded.is_superuser,
            is_active = excluded.is_active
        RETURNING id
        "#,
    )
    .bind(user.username.trim())
    .bind(user.is_superuser)
    .bind(user.is_active)
    .fetch_one(&mut *conn)
    .await?;

    let now = Utc::now();
    let section_codes: Vec<String> = user
        .section_admin
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    sqlx::query(
        r#"
        INSERT INTO user_profiles (user_id, school_id, is_sgod_admin, section_admin_codes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            school_id = excluded.school_id,
            is_sgod_admin = excluded.is_sgod_admin,
            section_admin_codes = excluded.section_admin_codes,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(school_id)
    .bind(user.sgod_admin)
    .bind(serde_json::to_string(&section_codes)?)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM user_profile_districts WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    for district_id in district_ids {
        sqlx::query("INSERT INTO user_profile_districts (user_id, district_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(district_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
districts:
  - { code: D1, name: North District }
sections:
  - { code: smme, name: SMME }
schools:
  - code: "100001"
    name: North ES
    district: D1
    min_grade: 1
    max_grade: 6
    profile:
      head_name: Ana Cruz
      strands: []
periods:
  - { label: Q1 SY 2025-2026, school_year_start: 2025, quarter_tag: Q1, display_order: 1 }
form_templates:
  - code: smea-q1
    section: smme
    title: SMEA Q1
    open_at: 2025-06-01
    close_at: 2025-08-31
users:
  - { username: head1, school: "100001" }
  - { username: psds1, districts: [D1] }
"#;

    #[test]
    fn test_parse_and_validate_sample_seed() {
        let seed = DivisionSeed::from_yaml(SEED).unwrap();
        assert_eq!(seed.schools.len(), 1);
        assert_eq!(seed.form_templates[0].period_type, "quarter");
        assert!(seed.users[0].is_active);
        seed.validate().unwrap();
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut seed = DivisionSeed::from_yaml(SEED).unwrap();
        seed.districts.push(DistrictSeed {
            code: "d1".to_string(),
            name: "Duplicate".to_string(),
        });
        seed.schools[0].district = Some("D9".to_string());
        seed.periods[0].quarter_tag = "Q5".to_string();
        seed.form_templates[0].close_at = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        seed.users[1].section_admin = vec!["hrd".to_string()];

        match seed.validate() {
            Err(ReportsError::Validation(errors)) => {
                assert_eq!(errors.len(), 5, "{:?}", errors);
                assert!(errors.iter().any(|e| e.contains("duplicate code 'd1'")));
                assert!(errors.iter().any(|e| e.contains("unknown district 'D9'")));
                assert!(errors.iter().any(|e| e.contains("Q1..Q4")));
                assert!(errors.iter().any(|e| e.contains("open_at")));
                assert!(errors.iter().any(|e| e.contains("unknown section 'hrd'")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DivisionSeed::load_from_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, ReportsError::Config(_)));
    }
}
