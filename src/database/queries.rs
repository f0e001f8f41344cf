use sqlx::SqlitePool;

use crate::database::models::*;
use crate::error::{ReportsError, Result};

pub struct Queries;

impl Queries {
    pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, is_superuser, is_active FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_profile(pool: &SqlitePool, user_id: i64) -> Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, school_id, is_sgod_admin, section_admin_codes
            FROM user_profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(profile)
    }

    pub async fn get_profile_district_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT district_id FROM user_profile_districts WHERE user_id = ? ORDER BY district_id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    pub async fn list_districts(pool: &SqlitePool) -> Result<Vec<District>> {
        let districts =
            sqlx::query_as::<_, District>("SELECT id, code, name FROM districts ORDER BY name")
                .fetch_all(pool)
                .await?;
        Ok(districts)
    }

    pub async fn list_sections(pool: &SqlitePool) -> Result<Vec<Section>> {
        let sections =
            sqlx::query_as::<_, Section>("SELECT id, code, name FROM sections ORDER BY name")
                .fetch_all(pool)
                .await?;
        Ok(sections)
    }

    pub async fn get_section(pool: &SqlitePool, section_id: i64) -> Result<Section> {
        sqlx::query_as::<_, Section>("SELECT id, code, name FROM sections WHERE id = ?")
            .bind(section_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ReportsError::not_found(format!("section {}", section_id)))
    }

    /// Section codes are matched case-insensitively.
    pub async fn get_section_by_code(pool: &SqlitePool, code: &str) -> Result<Section> {
        sqlx::query_as::<_, Section>(
            "SELECT id, code, name FROM sections WHERE lower(code) = lower(?)",
        )
        .bind(code.trim())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ReportsError::not_found(format!("section '{}'", code)))
    }

    pub async fn list_schools(pool: &SqlitePool) -> Result<Vec<School>> {
        let schools = sqlx::query_as::<_, School>(
            r#"
            SELECT id, code, name, division, district_id, school_type,
                   min_grade, max_grade, implements_adm
            FROM schools
            ORDER BY name
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(schools)
    }

    pub async fn get_school(pool: &SqlitePool, school_id: i64) -> Result<School> {
        sqlx::query_as::<_, School>(
            r#"
            SELECT id, code, name, division, district_id, school_type,
                   min_grade, max_grade, implements_adm
            FROM schools
            WHERE id = ?
            "#,
        )
        .bind(school_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ReportsError::not_found(format!("school {}", school_id)))
    }

    pub async fn get_school_profile(
        pool: &SqlitePool,
        school_id: i64,
    ) -> Result<Option<SchoolProfile>> {
        let profile = sqlx::query_as::<_, SchoolProfile>(
            r#"
            SELECT school_id, head_name, head_contact, grade_span_start, grade_span_end,
                   strands, notification_email, created_at, updated_at
            FROM school_profiles
            WHERE school_id = ?
            "#,
        )
        .bind(school_id)
        .fetch_optional(pool)
        .await?;
        Ok(profile)
    }

    pub async fn list_school_profiles(pool: &SqlitePool) -> Result<Vec<SchoolProfile>> {
        let profiles = sqlx::query_as::<_, SchoolProfile>(
            r#"
            SELECT school_id, head_name, head_contact, grade_span_start, grade_span_end,
                   strands, notification_email, created_at, updated_at
            FROM school_profiles
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(profiles)
    }

    pub async fn list_periods(pool: &SqlitePool) -> Result<Vec<Period>> {
        let periods = sqlx::query_as::<_, Period>(
            r#"
            SELECT id, label, school_year_start, quarter_tag, display_order, is_active
            FROM periods
            ORDER BY school_year_start DESC, display_order DESC
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(periods)
    }

    pub async fn get_period(pool: &SqlitePool, period_id: i64) -> Result<Period> {
        sqlx::query_as::<_, Period>(
            r#"
            SELECT id, label, school_year_start, quarter_tag, display_order, is_active
            FROM periods
            WHERE id = ?
            "#,
        )
        .bind(period_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ReportsError::not_found(format!("period {}", period_id)))
    }

    /// Newest active period, falling back to the newest of any period.
    pub async fn latest_period(pool: &SqlitePool) -> Result<Option<Period>> {
        let periods = Self::list_periods(pool).await?;
        let active = periods.iter().find(|p| p.is_active).cloned();
        Ok(active.or_else(|| periods.into_iter().next()))
    }

    pub async fn get_form_template(pool: &SqlitePool, template_id: i64) -> Result<FormTemplate> {
        sqlx::query_as::<_, FormTemplate>(
            r#"
            SELECT id, section_id, code, title, version, period_type, open_at, close_at,
                   is_active, school_year, quarter_filter, reading_timing_override
            FROM form_templates
            WHERE id = ?
            "#,
        )
        .bind(template_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ReportsError::not_found(format!("form template {}", template_id)))
    }

    pub async fn list_form_templates_for_section(
        pool: &SqlitePool,
        section_id: i64,
    ) -> Result<Vec<FormTemplate>> {
        let templates = sqlx::query_as::<_, FormTemplate>(
            r#"
            SELECT id, section_id, code, title, version, period_type, open_at, close_at,
                   is_active, school_year, quarter_filter, reading_timing_override
            FROM form_templates
            WHERE section_id = ?
            ORDER BY open_at DESC, close_at DESC, title
            "#,
        )
        .bind(section_id)
        .fetch_all(pool)
        .await?;
        Ok(templates)
    }

    pub async fn get_submission(pool: &SqlitePool, submission_id: i64) -> Result<Submission> {
        sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = ?")
            .bind(submission_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ReportsError::not_found(format!("submission {}", submission_id)))
    }

    pub async fn find_submission(
        pool: &SqlitePool,
        school_id: i64,
        template_id: i64,
        period_id: i64,
    ) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(
            r#"
            SELECT * FROM submissions
            WHERE school_id = ? AND form_template_id = ? AND period_id = ?
            "#,
        )
        .bind(school_id)
        .bind(template_id)
        .bind(period_id)
        .fetch_optional(pool)
        .await?;
        Ok(submission)
    }

    pub async fn list_submissions(pool: &SqlitePool) -> Result<Vec<Submission>> {
        let submissions =
            sqlx::query_as::<_, Submission>("SELECT * FROM submissions ORDER BY updated_at DESC")
                .fetch_all(pool)
                .await?;
        Ok(submissions)
    }

    pub async fn list_timeline(pool: &SqlitePool, submission_id: i64) -> Result<Vec<TimelineEntry>> {
        let entries = sqlx::query_as::<_, TimelineEntry>(
            r#"
            SELECT id, submission_id, actor_id, from_status, to_status, remarks, created_at
            FROM submission_timeline
            WHERE submission_id = ?
            ORDER BY id
            "#,
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?;
        Ok(entries)
    }
}
