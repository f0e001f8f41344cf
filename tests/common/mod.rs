#![allow(dead_code)]

use serde_json::json;
use sqlx::SqlitePool;

use sgod_reports::accounts::Actor;
use sgod_reports::config::loader::DivisionSeed;
use sgod_reports::config::AppConfig;
use sgod_reports::dashboards::DashboardCache;
use sgod_reports::database::models::Submission;
use sgod_reports::database::Database;
use sgod_reports::handlers::AppState;
use sgod_reports::submissions::forms::{NewActivity, NewProject};
use sgod_reports::submissions::{FormSection, SubmissionForms, SubmissionWorkflow};

/// Two districts, three schools, one section admin, a PSDS for the north,
/// an SGOD admin and accounts without any role.
pub const DIVISION_SEED: &str = r#"
districts:
  - { code: D1, name: North District }
  - { code: D2, name: South District }
sections:
  - { code: smme, name: School Management Monitoring and Evaluation }
  - { code: pr, name: Planning and Research }
schools:
  - code: "100001"
    name: Alpha Elementary School
    district: D1
    school_type: elementary
    min_grade: 1
    max_grade: 6
    implements_adm: true
    profile:
      head_name: Ana Cruz
      head_contact: "0917-000-0001"
      grade_span_start: 1
      grade_span_end: 6
      notification_email: alpha@example.org
  - code: "100002"
    name: Bravo National High School
    district: D1
    school_type: secondary
    min_grade: 7
    max_grade: 10
  - code: "200001"
    name: Charlie Elementary School
    district: D2
    school_type: elementary
    min_grade: 1
    max_grade: 6
    profile:
      head_name: Carlo Reyes
      head_contact: ""
periods:
  - { label: "Q1 SY 2025-2026", school_year_start: 2025, quarter_tag: Q1, display_order: 1 }
  - { label: "Q2 SY 2025-2026", school_year_start: 2025, quarter_tag: Q2, display_order: 2 }
form_templates:
  - code: smea-2025
    section: smme
    title: SMEA Quarterly Report
    open_at: 2000-01-01
    close_at: 2099-12-31
  - code: pr-2025
    section: pr
    title: Planning Survey
    open_at: 2000-01-01
    close_at: 2099-12-31
users:
  - { username: head_alpha, school: "100001" }
  - { username: head_bravo, school: "100002" }
  - { username: head_charlie, school: "200001" }
  - { username: psds_north, districts: [D1] }
  - { username: smme_admin, section_admin: [smme] }
  - { username: sgod, sgod_admin: true }
  - { username: nobody }
  - { username: retired, school: "100001", is_active: false }
"#;

pub struct TestEnv {
    pub db: Database,
    pub cache: DashboardCache,
    pub workflow: SubmissionWorkflow,
    pub forms: SubmissionForms,
}

impl TestEnv {
    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    pub async fn actor(&self, username: &str) -> Actor {
        Actor::load(self.pool(), username).await.expect("actor")
    }

    pub async fn school_id(&self, code: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT id FROM schools WHERE code = ?")
            .bind(code)
            .fetch_one(self.pool())
            .await
            .expect("school")
    }

    pub async fn template_id(&self, code: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT id FROM form_templates WHERE code = ?")
            .bind(code)
            .fetch_one(self.pool())
            .await
            .expect("template")
    }

    pub async fn period_id(&self, quarter: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM periods WHERE school_year_start = 2025 AND quarter_tag = ?",
        )
        .bind(quarter)
        .fetch_one(self.pool())
        .await
        .expect("period")
    }

    /// Draft SMEA submission for the head's school in the given quarter.
    pub async fn draft(&self, head: &str, quarter: &str) -> Submission {
        let actor = self.actor(head).await;
        let template_id = self.template_id("smea-2025").await;
        let period_id = self.period_id(quarter).await;
        let (submission, _) = self
            .workflow
            .start(&actor, template_id, period_id)
            .await
            .expect("start");
        submission
    }

    /// Adds one project with one activity so the submission can be submitted.
    pub async fn make_ready(&self, head: &str, submission_id: i64) {
        let actor = self.actor(head).await;
        let project = self
            .forms
            .add_project(
                &actor,
                submission_id,
                NewProject {
                    project_title: "Reading Recovery".to_string(),
                    area_of_concern: "Literacy".to_string(),
                    conference_date: None,
                },
            )
            .await
            .expect("project");
        let activity: NewActivity = serde_json::from_value(json!({
            "activity": "Daily reading sessions",
            "output_target": "40 learners"
        }))
        .expect("activity payload");
        self.forms
            .add_activity(&actor, project.id, activity)
            .await
            .expect("activity");
    }

    /// Draft, made ready and submitted.
    pub async fn submitted(&self, head: &str, quarter: &str) -> Submission {
        let draft = self.draft(head, quarter).await;
        self.make_ready(head, draft.id).await;
        let actor = self.actor(head).await;
        self.workflow
            .mark_submitted(&actor, draft.id)
            .await
            .expect("submit")
    }

    pub async fn save(&self, head: &str, submission_id: i64, section: FormSection, payload: serde_json::Value) {
        let actor = self.actor(head).await;
        self.forms
            .save_section(&actor, submission_id, section, payload)
            .await
            .expect("save section");
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.pool().clone(), test_config())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::load_from("does-not-exist-sgod-reports-test").expect("default config")
}

/// In-memory database with migrations applied and the division seeded.
pub async fn setup() -> TestEnv {
    let db = Database::new_in_memory().await.expect("in-memory database");
    DivisionSeed::from_yaml(DIVISION_SEED)
        .expect("seed yaml")
        .apply(db.pool())
        .await
        .expect("apply seed");
    let cache = DashboardCache::new(std::time::Duration::from_secs(300));
    TestEnv {
        workflow: SubmissionWorkflow::new(db.pool().clone(), cache.clone(), "https://reports.example.org"),
        forms: SubmissionForms::new(db.pool().clone()),
        cache,
        db,
    }
}
