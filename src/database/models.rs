use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::notifications::NotificationStatus;
use crate::submissions::status::SubmissionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct District {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct School {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub division: String,
    pub district_id: Option<i64>,
    pub school_type: String,
    pub min_grade: Option<i64>,
    pub max_grade: Option<i64>,
    pub implements_adm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SchoolProfile {
    pub school_id: i64,
    pub head_name: String,
    pub head_contact: String,
    pub grade_span_start: Option<i64>,
    pub grade_span_end: Option<i64>,
    #[sqlx(json)]
    pub strands: Vec<String>,
    pub notification_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: i64,
    pub school_id: Option<i64>,
    pub is_sgod_admin: bool,
    #[sqlx(json)]
    pub section_admin_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Period {
    pub id: i64,
    pub label: String,
    pub school_year_start: i64,
    pub quarter_tag: String,
    pub display_order: i64,
    pub is_active: bool,
}

impl Period {
    pub fn school_year_end(&self) -> i64 {
        self.school_year_start + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormTemplate {
    pub id: i64,
    pub section_id: i64,
    pub code: String,
    pub title: String,
    pub version: String,
    pub period_type: String,
    pub open_at: NaiveDate,
    pub close_at: NaiveDate,
    pub is_active: bool,
    pub school_year: Option<i64>,
    pub quarter_filter: String,
    pub reading_timing_override: String,
}

impl FormTemplate {
    pub fn is_open_on(&self, date: NaiveDate) -> bool {
        self.is_active && self.open_at <= date && date <= self.close_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: i64,
    pub school_id: i64,
    pub form_template_id: i64,
    pub period_id: i64,
    pub status: SubmissionStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<i64>,
    pub returned_at: Option<DateTime<Utc>>,
    pub returned_by: Option<i64>,
    pub returned_remarks: String,
    pub noted_at: Option<DateTime<Utc>>,
    pub noted_by: Option<i64>,
    pub noted_remarks: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified_by: Option<i64>,
}

impl Submission {
    pub fn can_submit(&self) -> bool {
        self.status.is_editable()
    }

    pub fn is_editable_by_school(&self) -> bool {
        self.status.is_editable()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimelineEntry {
    pub id: i64,
    pub submission_id: i64,
    pub actor_id: Option<i64>,
    pub from_status: String,
    pub to_status: String,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SmeaProject {
    pub id: i64,
    pub submission_id: i64,
    pub project_title: String,
    pub area_of_concern: String,
    pub conference_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SmeaActivity {
    pub id: i64,
    pub project_id: i64,
    pub activity: String,
    pub output_target: String,
    pub output_actual: String,
    pub timeframe_target: String,
    pub timeframe_actual: String,
    pub budget_target: String,
    pub budget_actual: String,
    pub interpretation: String,
    pub issues_unaddressed: String,
    pub facilitating_factors: String,
    pub agreements: String,
    pub row_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PctRow {
    pub id: i64,
    pub submission_id: i64,
    pub area: String,
    pub percent: Option<i64>,
    pub action_points: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlpRow {
    pub id: i64,
    pub submission_id: i64,
    pub grade_label: String,
    pub subject: String,
    pub enrolment: i64,
    pub dnme: i64,
    pub fs: i64,
    pub s: i64,
    pub vs: i64,
    pub o: i64,
    pub is_offered: bool,
    pub top_three_llc: String,
    pub non_mastery_reasons: String,
    pub non_mastery_other: String,
    pub intervention_plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CrlaRow {
    pub id: i64,
    pub submission_id: i64,
    pub period: String,
    pub level: String,
    pub mt_grade_1: i64,
    pub mt_grade_2: i64,
    pub mt_grade_3: i64,
    pub fil_grade_2: i64,
    pub fil_grade_3: i64,
    pub eng_grade_3: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PhiliriRow {
    pub id: i64,
    pub submission_id: i64,
    pub period: String,
    pub level: String,
    pub eng_grade_4: i64,
    pub eng_grade_5: i64,
    pub eng_grade_6: i64,
    pub eng_grade_7: i64,
    pub eng_grade_8: i64,
    pub eng_grade_9: i64,
    pub eng_grade_10: i64,
    pub fil_grade_4: i64,
    pub fil_grade_5: i64,
    pub fil_grade_6: i64,
    pub fil_grade_7: i64,
    pub fil_grade_8: i64,
    pub fil_grade_9: i64,
    pub fil_grade_10: i64,
}

impl PhiliriRow {
    /// English counts for grades 4 through 10.
    pub fn eng_counts(&self) -> [i64; 7] {
        [
            self.eng_grade_4,
            self.eng_grade_5,
            self.eng_grade_6,
            self.eng_grade_7,
            self.eng_grade_8,
            self.eng_grade_9,
            self.eng_grade_10,
        ]
    }

    /// Filipino counts for grades 4 through 10.
    pub fn fil_counts(&self) -> [i64; 7] {
        [
            self.fil_grade_4,
            self.fil_grade_5,
            self.fil_grade_6,
            self.fil_grade_7,
            self.fil_grade_8,
            self.fil_grade_9,
            self.fil_grade_10,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RmaRow {
    pub id: i64,
    pub submission_id: i64,
    pub grade_label: String,
    pub enrolment: i64,
    pub emerging_not_proficient: i64,
    pub emerging_low_proficient: i64,
    pub developing_nearly_proficient: i64,
    pub transitioning_proficient: i64,
    pub at_grade_level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SupervisionRow {
    pub id: i64,
    pub submission_id: i64,
    pub grade_label: String,
    pub total_teachers: i64,
    pub teachers_supervised_observed_ta: i64,
    pub intervention_support_provided: String,
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdmHeader {
    pub submission_id: i64,
    pub is_offered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdmRow {
    pub id: i64,
    pub submission_id: i64,
    pub ppas_conducted: String,
    pub ppas_physical_target: i64,
    pub ppas_physical_actual: i64,
    pub ppas_physical_percent: f64,
    pub funds_downloaded: f64,
    pub funds_obligated: f64,
    pub funds_unobligated: f64,
    pub funds_percent_obligated: f64,
    pub funds_percent_burn_rate: f64,
    pub q1_response: String,
    pub q2_response: String,
    pub q3_response: String,
    pub q4_response: String,
    pub q5_response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlpAnalysis {
    pub id: i64,
    pub submission_id: i64,
    pub grade_label: String,
    pub subject: String,
    pub dnme_factors: String,
    pub fs_factors: String,
    pub s_practices: String,
    pub vs_practices: String,
    pub o_practices: String,
    pub overall_strategy: String,
}

impl SlpAnalysis {
    pub fn has_content(&self) -> bool {
        [
            &self.dnme_factors,
            &self.fs_factors,
            &self.s_practices,
            &self.vs_practices,
            &self.o_practices,
            &self.overall_strategy,
        ]
        .iter()
        .any(|text| !text.trim().is_empty())
    }
}

/// One of the three least-learned competencies and its intervention.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlpLlcEntry {
    pub id: i64,
    pub submission_id: i64,
    pub position: i64,
    pub llc_description: String,
    pub intervention: String,
}

/// Ranked grade in the top-DNME or top-outstanding list (`kind`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlpTopEntry {
    pub id: i64,
    pub submission_id: i64,
    pub kind: String,
    pub position: i64,
    pub grade_label: String,
    pub learner_count: i64,
}

/// Numbered intervention line; shared by the reading and RMA lists.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterventionRow {
    pub id: i64,
    pub submission_id: i64,
    pub position: i64,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyPair {
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub intervention: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReadingDifficultyPlan {
    pub id: i64,
    pub submission_id: i64,
    pub period: String,
    pub grade_label: String,
    pub data: sqlx::types::Json<Vec<DifficultyPair>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Signatories {
    pub submission_id: i64,
    pub prepared_by: String,
    pub submitted_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailNotification {
    pub id: i64,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub html_body: String,
    pub status: NotificationStatus,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
}
