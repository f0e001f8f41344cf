mod common;

use serde_json::json;

use sgod_reports::accounts::SchoolScope;
use sgod_reports::dashboards::calculator::{self, PartKpi};
use sgod_reports::dashboards::{self, KpiFilter, KpiPart};
use sgod_reports::submissions::FormSection;
use sgod_reports::ReportsError;

fn filter_2025() -> KpiFilter {
    KpiFilter {
        school_year: 2025,
        ..Default::default()
    }
}

/// Alpha submits Q1 with PCT, SLP, CRLA, RMA and supervision rows;
/// Charlie keeps a draft with data that must never be counted.
async fn seeded_env() -> common::TestEnv {
    let env = common::setup().await;

    let alpha = env.draft("head_alpha", "Q1").await;
    env.make_ready("head_alpha", alpha.id).await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Pct,
        json!([
            { "area": "access", "percent": 80 },
            { "area": "quality", "percent": 60 },
            { "area": "enabling_mechanisms", "percent": 100 }
        ]),
    )
    .await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Slp,
        json!([
            { "grade_label": "Grade 1", "subject": "mathematics", "enrolment": 40,
              "dnme": 4, "fs": 6, "s": 10, "vs": 10, "o": 10 },
            { "grade_label": "Grade 2", "subject": "english", "enrolment": 30,
              "dnme": 30, "is_offered": false }
        ]),
    )
    .await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Crla,
        json!([
            { "level": "low_emerging", "mt_grade_1": 5 },
            { "level": "developing", "mt_grade_1": 15 }
        ]),
    )
    .await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Rma,
        json!([
            { "grade_label": "g1", "enrolment": 20, "emerging_not_proficient": 2,
              "emerging_low_proficient": 3, "developing_nearly_proficient": 5,
              "transitioning_proficient": 5, "at_grade_level": 5 }
        ]),
    )
    .await;
    env.save(
        "head_alpha",
        alpha.id,
        FormSection::Supervision,
        json!([
            { "grade_label": "Grade 1", "total_teachers": 4, "teachers_supervised_observed_ta": 3,
              "intervention_support_provided": "Coaching", "result": "Improved pacing" },
            { "grade_label": "Grade 2", "total_teachers": 3, "teachers_supervised_observed_ta": 1 }
        ]),
    )
    .await;
    let head = env.actor("head_alpha").await;
    env.workflow.mark_submitted(&head, alpha.id).await.unwrap();

    let charlie = env.draft("head_charlie", "Q1").await;
    env.save(
        "head_charlie",
        charlie.id,
        FormSection::Slp,
        json!([{ "grade_label": "Grade 1", "subject": "mathematics", "enrolment": 10, "dnme": 10 }]),
    )
    .await;

    env
}

#[tokio::test]
async fn test_school_rows_count_completed_submissions_only() {
    let env = seeded_env().await;
    let rows = calculator::school_kpis(env.pool(), &SchoolScope::All, KpiPart::Slp, &filter_2025())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].school.school_name, "Alpha Elementary School");
    assert_eq!(rows[0].school.district_name, "North District");
    match rows[0].kpi {
        PartKpi::Slp(slp) => {
            assert_eq!(slp.total_enrollment, 40);
            assert_eq!(slp.dnme_percent, 10.0);
            assert_eq!(slp.fs_percent, 15.0);
            assert_eq!(slp.o_percent, 25.0);
        }
        other => panic!("unexpected kpi {:?}", other),
    }
}

#[tokio::test]
async fn test_part_rows_follow_filters() {
    let env = seeded_env().await;

    let rows = calculator::school_kpis(
        env.pool(),
        &SchoolScope::All,
        KpiPart::Implementation,
        &filter_2025(),
    )
    .await
    .unwrap();
    match rows[0].kpi {
        PartKpi::Implementation(pct) => {
            assert_eq!(pct.access_percent, 80.0);
            assert_eq!(pct.quality_percent, 60.0);
            assert_eq!(pct.equity_percent, 0.0);
            assert_eq!(pct.enabling_percent, 100.0);
        }
        other => panic!("unexpected kpi {:?}", other),
    }

    // Q1 reading assessments are recorded as end of school year.
    let mut eosy = filter_2025();
    eosy.assessment_period = Some("eosy".to_string());
    let rows = calculator::school_kpis(env.pool(), &SchoolScope::All, KpiPart::Crla, &eosy)
        .await
        .unwrap();
    match rows[0].kpi {
        PartKpi::Crla(crla) => {
            assert_eq!(crla.total_learners, 20);
            assert_eq!(crla.low_emerging_percent, 25.0);
            assert_eq!(crla.developing_percent, 75.0);
        }
        other => panic!("unexpected kpi {:?}", other),
    }
    let rows = calculator::school_kpis(env.pool(), &SchoolScope::All, KpiPart::Crla, &filter_2025())
        .await
        .unwrap();
    assert_eq!(rows[0].kpi, PartKpi::Crla(Default::default()));

    let mut q2 = filter_2025();
    q2.quarter = Some("q2".to_string());
    let rows = calculator::school_kpis(env.pool(), &SchoolScope::All, KpiPart::Slp, &q2)
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = calculator::school_kpis(env.pool(), &SchoolScope::All, KpiPart::Supervision, &filter_2025())
        .await
        .unwrap();
    match rows[0].kpi {
        PartKpi::Supervision(sup) => {
            assert_eq!(sup.teachers_supervised_count, 4);
            assert_eq!(sup.supervision_entries, 2);
            assert_eq!(sup.completion_rate, 50.0);
        }
        other => panic!("unexpected kpi {:?}", other),
    }
}

#[tokio::test]
async fn test_period_and_quarter_kpis() {
    let env = seeded_env().await;
    let q1 = env.period_id("Q1").await;

    let kpis = calculator::kpis_for_period(env.pool(), &SchoolScope::All, q1, None, Some("eosy"))
        .await
        .unwrap();
    assert_eq!(kpis.slp.total_schools, 1);
    assert_eq!(kpis.slp.kpi.dnme_percent, 10.0);
    assert_eq!(kpis.crla.total_schools, 1);
    assert_eq!(kpis.rma.kpi.total_enrollment, 20);
    assert_eq!(kpis.rma.kpi.at_grade_level_percent, 25.0);
    assert_eq!(kpis.implementation.total_schools, 1);
    assert_eq!(kpis.adm.schools_offering_adm, 0);

    let other_section =
        calculator::kpis_for_period(env.pool(), &SchoolScope::All, q1, Some("pr"), None)
            .await
            .unwrap();
    assert_eq!(other_section.slp.total_schools, 0);

    let quarters = calculator::kpis_for_quarters(env.pool(), &SchoolScope::All, 2025, None, None)
        .await
        .unwrap();
    let labels: Vec<&str> = quarters.iter().map(|q| q.period_label.as_str()).collect();
    assert_eq!(labels, vec!["Q1", "Q2"]);
    assert_eq!(quarters[0].kpis.slp.total_schools, 1);
    assert_eq!(quarters[1].kpis.slp.total_schools, 0);

    let err = calculator::kpis_for_quarters(env.pool(), &SchoolScope::All, 2031, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportsError::NotFound(_)));
}

#[tokio::test]
async fn test_dashboard_rows_respect_scope() {
    let env = seeded_env().await;
    let reviewer = env.actor("smme_admin").await;
    let charlie = env.submitted("head_charlie", "Q2").await;
    env.workflow.mark_noted(&reviewer, charlie.id, None).await.unwrap();

    let sgod = env.actor("sgod").await;
    let rows = dashboards::school_kpis(env.pool(), &env.cache, &sgod, KpiPart::Slp, &filter_2025())
        .await
        .unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);

    let psds = env.actor("psds_north").await;
    let rows = dashboards::school_kpis(env.pool(), &env.cache, &psds, KpiPart::Slp, &filter_2025())
        .await
        .unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["school_name"], "Alpha Elementary School");
    assert_eq!(rows[0]["dnme_percent"], 10.0);

    let nobody = env.actor("nobody").await;
    let err = dashboards::school_kpis(env.pool(), &env.cache, &nobody, KpiPart::Slp, &filter_2025())
        .await
        .unwrap_err();
    assert!(matches!(err, ReportsError::Forbidden(_)));
}

#[tokio::test]
async fn test_status_change_invalidates_cached_rows() {
    let env = seeded_env().await;
    let sgod = env.actor("sgod").await;
    let reviewer = env.actor("smme_admin").await;

    let rows = dashboards::school_kpis(env.pool(), &env.cache, &sgod, KpiPart::Slp, &filter_2025())
        .await
        .unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(env.cache.len().await, 1);

    let alpha = env.school_id("100001").await;
    let submission = sqlx::query_scalar::<_, i64>("SELECT id FROM submissions WHERE school_id = ?")
        .bind(alpha)
        .fetch_one(env.pool())
        .await
        .unwrap();
    env.workflow
        .mark_returned(&reviewer, submission, "Recheck SLP counts")
        .await
        .unwrap();
    assert_eq!(env.cache.len().await, 0);

    let rows = dashboards::school_kpis(env.pool(), &env.cache, &sgod, KpiPart::Slp, &filter_2025())
        .await
        .unwrap();
    assert!(rows.as_array().unwrap().is_empty());

    let quarters = dashboards::quarter_kpis(env.pool(), &env.cache, &sgod, 2025, None, Some("eosy"))
        .await
        .unwrap();
    assert_eq!(quarters.as_array().unwrap().len(), 2);
    assert_eq!(quarters[0]["period_label"], "Q1");
}
