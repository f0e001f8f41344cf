mod common;

use serde_json::json;

use sgod_reports::dashboards::gaps::{district_submission_gaps, GapsFilter};
use sgod_reports::dashboards::overview::{division_overview, OverviewFilter};
use sgod_reports::submissions::FormSection;
use sgod_reports::ReportsError;

async fn district_id(env: &common::TestEnv, code: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT id FROM districts WHERE code = ?")
        .bind(code)
        .fetch_one(env.pool())
        .await
        .unwrap()
}

/// Alpha and Bravo (north) submit Q1; Charlie (south) does not.
async fn q1_env() -> common::TestEnv {
    let env = common::setup().await;

    let alpha = env.draft("head_alpha", "Q1").await;
    env.make_ready("head_alpha", alpha.id).await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Slp,
        json!([{ "grade_label": "Grade 1", "subject": "mathematics", "enrolment": 40, "dnme": 4 }]),
    )
    .await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Adm,
        json!({
            "is_offered": true,
            "rows": [{
                "ppas_conducted": "Modular sessions",
                "ppas_physical_target": 10,
                "ppas_physical_actual": 8,
                "ppas_physical_percent": 80.0,
                "funds_downloaded": 1000.0,
                "funds_obligated": 800.0,
                "funds_unobligated": 200.0,
                "funds_percent_obligated": 80.0,
                "funds_percent_burn_rate": 80.0
            }]
        }),
    )
    .await;

    // Grade 3 data is outside Bravo's grade 7-10 span.
    let bravo = env.draft("head_bravo", "Q1").await;
    env.make_ready("head_bravo", bravo.id).await;
    env.save(
        "head_bravo",
        bravo.id,
        FormSection::Slp,
        json!([{ "grade_label": "Grade 3", "subject": "english", "enrolment": 10, "dnme": 6 }]),
    )
    .await;

    for (head, id) in [("head_alpha", alpha.id), ("head_bravo", bravo.id)] {
        let actor = env.actor(head).await;
        env.workflow.mark_submitted(&actor, id).await.unwrap();
    }
    env
}

fn q1_gaps(period_id: i64) -> GapsFilter {
    GapsFilter {
        section: Some("smme".to_string()),
        period_id: Some(period_id),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_gaps_list_missing_schools_per_district() {
    let env = q1_env().await;
    let reviewer = env.actor("smme_admin").await;
    let q1 = env.period_id("Q1").await;

    let gaps = district_submission_gaps(env.pool(), &reviewer, &q1_gaps(q1)).await.unwrap();
    assert_eq!(gaps.selected_form.as_ref().unwrap().code, "smea-2025");
    assert_eq!(gaps.district_rows.len(), 2);
    assert_eq!(gaps.total_schools, 3);
    assert_eq!(gaps.total_submitted, 2);
    assert_eq!(gaps.total_missing, 1);

    let north = &gaps.district_rows[0];
    assert_eq!(north.district_name, "North District");
    assert_eq!((north.submitted_count, north.missing_count), (2, 0));

    let south = &gaps.district_rows[1];
    assert_eq!(south.district_name, "South District");
    assert_eq!(south.missing_schools.len(), 1);
    let missing = &south.missing_schools[0];
    assert_eq!(missing.school.code, "200001");
    assert_eq!(missing.head_name, "Carlo Reyes");
    assert!(!missing.missing_profile);
    assert!(missing.missing_head_contact);
}

#[tokio::test]
async fn test_gaps_for_a_later_period_count_everyone_missing() {
    let env = q1_env().await;
    let reviewer = env.actor("smme_admin").await;
    let q2 = env.period_id("Q2").await;

    let gaps = district_submission_gaps(env.pool(), &reviewer, &q1_gaps(q2)).await.unwrap();
    assert_eq!(gaps.total_submitted, 0);
    assert_eq!(gaps.total_missing, 3);
    let bravo = gaps.district_rows[0]
        .missing_schools
        .iter()
        .find(|m| m.school.code == "100002")
        .unwrap();
    assert!(bravo.missing_profile);
    assert!(bravo.missing_head_name);
}

#[tokio::test]
async fn test_gaps_respect_scope_and_district_filter() {
    let env = q1_env().await;
    let q1 = env.period_id("Q1").await;

    let psds = env.actor("psds_north").await;
    let gaps = district_submission_gaps(env.pool(), &psds, &q1_gaps(q1)).await.unwrap();
    assert_eq!(gaps.districts.len(), 1);
    assert_eq!(gaps.district_rows.len(), 1);
    assert_eq!(gaps.district_rows[0].district_name, "North District");
    assert_eq!(gaps.total_missing, 0);

    let sgod = env.actor("sgod").await;
    let south = district_id(&env, "D2").await;
    let filter = GapsFilter {
        district_id: Some(south),
        ..q1_gaps(q1)
    };
    let gaps = district_submission_gaps(env.pool(), &sgod, &filter).await.unwrap();
    assert_eq!(gaps.districts.len(), 2);
    assert_eq!(gaps.selected_district_id, Some(south));
    assert_eq!(gaps.district_rows.len(), 1);
    assert_eq!(gaps.total_schools, 1);

    let head = env.actor("head_alpha").await;
    let err = district_submission_gaps(env.pool(), &head, &q1_gaps(q1)).await.unwrap_err();
    assert!(matches!(err, ReportsError::Forbidden(_)));
}

#[tokio::test]
async fn test_gaps_unknown_form_is_not_found() {
    let env = q1_env().await;
    let reviewer = env.actor("smme_admin").await;
    let filter = GapsFilter {
        form_code: Some("pr-2025".to_string()),
        ..q1_gaps(env.period_id("Q1").await)
    };
    let err = district_submission_gaps(env.pool(), &reviewer, &filter).await.unwrap_err();
    assert!(matches!(err, ReportsError::NotFound(_)));
}

#[tokio::test]
async fn test_division_overview_totals() {
    let env = q1_env().await;
    let sgod = env.actor("sgod").await;
    let filter = OverviewFilter {
        period_id: Some(env.period_id("Q1").await),
        section_code: Some("SMME".to_string()),
        ..Default::default()
    };

    let overview = division_overview(env.pool(), &sgod, &filter).await.unwrap();
    assert_eq!(overview.kpi_rows.len(), 2);

    let north = &overview.kpi_rows[0];
    assert_eq!(north.district_name, "North District");
    assert_eq!(north.submitted_count, 2);
    assert_eq!(north.completion_rate, 100.0);
    assert_eq!(north.total_dnme, 10);
    assert_eq!(north.total_enrolment, 50);
    assert_eq!(north.dnme_percent, 20.0);
    assert_eq!(north.adm_records, 1);
    assert_eq!(north.average_burn_rate, 80.0);
    let warnings: Vec<(&str, bool)> = north
        .school_profiles
        .iter()
        .map(|p| (p.school.code.as_str(), p.grade_span_warning))
        .collect();
    assert_eq!(warnings, vec![("100001", false), ("100002", true)]);

    let south = &overview.kpi_rows[1];
    assert_eq!((south.total_schools, south.submitted_count), (1, 0));
    assert_eq!(south.completion_rate, 0.0);

    let summary = overview.summary.unwrap();
    assert_eq!(summary.total_schools, 3);
    assert_eq!(summary.submitted_count, 2);
    assert_eq!(summary.completion_rate, 66.67);
    assert_eq!(summary.dnme_percent, 20.0);
    assert_eq!(overview.summary_cards.len(), 4);
}

#[tokio::test]
async fn test_division_overview_section_fallback_and_guard() {
    let env = q1_env().await;
    let sgod = env.actor("sgod").await;
    let filter = OverviewFilter {
        period_id: Some(env.period_id("Q1").await),
        section_code: Some("unknown".to_string()),
        ..Default::default()
    };
    let overview = division_overview(env.pool(), &sgod, &filter).await.unwrap();
    // Sections are listed by name, so Planning and Research comes first.
    assert_eq!(overview.selected_section_code, "pr");
    assert_eq!(overview.summary.unwrap().submitted_count, 0);

    for username in ["smme_admin", "psds_north", "head_alpha"] {
        let actor = env.actor(username).await;
        let err = division_overview(env.pool(), &actor, &OverviewFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportsError::Forbidden(_)), "{} should be refused", username);
    }
}
