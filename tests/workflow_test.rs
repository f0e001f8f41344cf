mod common;

use sgod_reports::database::queries::Queries;
use sgod_reports::submissions::SubmissionStatus;
use sgod_reports::ReportsError;

async fn pending_notifications(env: &common::TestEnv) -> Vec<(String, String)> {
    sqlx::query_as::<_, (String, String)>(
        "SELECT to_email, subject FROM email_notifications WHERE status = 'pending' ORDER BY id",
    )
    .fetch_all(env.pool())
    .await
    .expect("notifications")
}

#[tokio::test]
async fn test_start_is_idempotent_per_school_template_period() {
    let env = common::setup().await;
    let head = env.actor("head_alpha").await;
    let template_id = env.template_id("smea-2025").await;
    let period_id = env.period_id("Q1").await;

    let (first, created) = env.workflow.start(&head, template_id, period_id).await.unwrap();
    assert!(created);
    assert_eq!(first.status, SubmissionStatus::Draft);

    let (second, created) = env.workflow.start(&head, template_id, period_id).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);

    let timeline = Queries::list_timeline(env.pool(), first.id).await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].from_status, "");
    assert_eq!(timeline[0].to_status, "draft");
}

#[tokio::test]
async fn test_start_requires_school_head() {
    let env = common::setup().await;
    let template_id = env.template_id("smea-2025").await;
    let period_id = env.period_id("Q1").await;

    let psds = env.actor("psds_north").await;
    let err = env.workflow.start(&psds, template_id, period_id).await.unwrap_err();
    assert!(matches!(err, ReportsError::Forbidden(_)));
}

#[tokio::test]
async fn test_submit_requires_projects_with_activities() {
    let env = common::setup().await;
    let head = env.actor("head_alpha").await;
    let draft = env.draft("head_alpha", "Q1").await;

    let err = env.workflow.mark_submitted(&head, draft.id).await.unwrap_err();
    match err {
        ReportsError::Validation(messages) => {
            assert_eq!(messages, vec!["Add at least one project before submitting.".to_string()]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    env.make_ready("head_alpha", draft.id).await;
    let submitted = env.workflow.mark_submitted(&head, draft.id).await.unwrap();
    assert_eq!(submitted.status, SubmissionStatus::Submitted);
    assert_eq!(submitted.submitted_by, Some(head.user_id));
    assert!(submitted.submitted_at.is_some());
}

#[tokio::test]
async fn test_other_school_head_cannot_submit() {
    let env = common::setup().await;
    let draft = env.draft("head_alpha", "Q1").await;
    env.make_ready("head_alpha", draft.id).await;

    let other = env.actor("head_charlie").await;
    let err = env.workflow.mark_submitted(&other, draft.id).await.unwrap_err();
    assert!(matches!(err, ReportsError::Forbidden(_)));
}

#[tokio::test]
async fn test_return_and_resubmit_cycle_records_timeline() {
    let env = common::setup().await;
    let head = env.actor("head_alpha").await;
    let reviewer = env.actor("smme_admin").await;
    let submission = env.submitted("head_alpha", "Q1").await;

    let err = env
        .workflow
        .mark_returned(&reviewer, submission.id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ReportsError::Validation(_)));

    let returned = env
        .workflow
        .mark_returned(&reviewer, submission.id, "Complete the PCT section.")
        .await
        .unwrap();
    assert_eq!(returned.status, SubmissionStatus::Returned);
    assert_eq!(returned.returned_remarks, "Complete the PCT section.");
    assert_eq!(returned.returned_by, Some(reviewer.user_id));

    let resubmitted = env.workflow.mark_submitted(&head, submission.id).await.unwrap();
    assert_eq!(resubmitted.status, SubmissionStatus::Submitted);
    assert!(resubmitted.returned_at.is_none());
    assert_eq!(resubmitted.returned_remarks, "Complete the PCT section.");

    let noted = env
        .workflow
        .mark_noted(&reviewer, submission.id, None)
        .await
        .unwrap();
    assert_eq!(noted.status, SubmissionStatus::Noted);

    let steps: Vec<(String, String)> = Queries::list_timeline(env.pool(), submission.id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.from_status, t.to_status))
        .collect();
    let expected = [
        ("", "draft"),
        ("draft", "submitted"),
        ("submitted", "returned"),
        ("returned", "submitted"),
        ("submitted", "noted"),
    ];
    assert_eq!(steps.len(), expected.len());
    for ((from, to), (want_from, want_to)) in steps.iter().zip(expected) {
        assert_eq!(from, want_from);
        assert_eq!(to, want_to);
    }
}

#[tokio::test]
async fn test_invalid_transitions_conflict() {
    let env = common::setup().await;
    let head = env.actor("head_alpha").await;
    let reviewer = env.actor("smme_admin").await;

    let draft = env.draft("head_alpha", "Q1").await;
    let err = env.workflow.mark_noted(&reviewer, draft.id, None).await.unwrap_err();
    assert!(matches!(err, ReportsError::Conflict(_)));
    let err = env
        .workflow
        .mark_returned(&reviewer, draft.id, "too early")
        .await
        .unwrap_err();
    assert!(matches!(err, ReportsError::Conflict(_)));

    let submission = env.submitted("head_alpha", "Q2").await;
    env.workflow.mark_noted(&reviewer, submission.id, Some("Good work")).await.unwrap();
    let err = env.workflow.mark_submitted(&head, submission.id).await.unwrap_err();
    assert!(matches!(err, ReportsError::Conflict(_)));
}

#[tokio::test]
async fn test_review_requires_admin_of_owning_section() {
    let env = common::setup().await;
    let submission = env.submitted("head_alpha", "Q1").await;

    for username in ["psds_north", "head_alpha", "nobody"] {
        let actor = env.actor(username).await;
        let err = env
            .workflow
            .mark_noted(&actor, submission.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportsError::Forbidden(_)), "{} should be refused", username);
    }

    let sgod = env.actor("sgod").await;
    let noted = env.workflow.mark_noted(&sgod, submission.id, None).await.unwrap();
    assert_eq!(noted.status, SubmissionStatus::Noted);
}

#[tokio::test]
async fn test_reopen_is_sgod_only() {
    let env = common::setup().await;
    let reviewer = env.actor("smme_admin").await;
    let submission = env.submitted("head_alpha", "Q1").await;
    env.workflow.mark_noted(&reviewer, submission.id, None).await.unwrap();

    let err = env.workflow.mark_draft(&reviewer, submission.id).await.unwrap_err();
    assert!(matches!(err, ReportsError::Forbidden(_)));

    let sgod = env.actor("sgod").await;
    let reopened = env.workflow.mark_draft(&sgod, submission.id).await.unwrap();
    assert_eq!(reopened.status, SubmissionStatus::Draft);
    assert!(reopened.noted_at.is_none());

    // Already a draft: nothing is recorded.
    let before = Queries::list_timeline(env.pool(), submission.id).await.unwrap().len();
    env.workflow.mark_draft(&sgod, submission.id).await.unwrap();
    let after = Queries::list_timeline(env.pool(), submission.id).await.unwrap().len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_status_changes_queue_email_for_schools_with_address() {
    let env = common::setup().await;
    let reviewer = env.actor("smme_admin").await;

    let submission = env.submitted("head_alpha", "Q1").await;
    env.workflow
        .mark_returned(&reviewer, submission.id, "Missing SLP data")
        .await
        .unwrap();

    let queued = pending_notifications(&env).await;
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|(to, _)| to == "alpha@example.org"));
    assert!(queued[0].1.starts_with("Submitted: SMEA Quarterly Report"));
    assert!(queued[1].1.starts_with("Returned: SMEA Quarterly Report"));

    let body: String = sqlx::query_scalar(
        "SELECT body FROM email_notifications WHERE subject LIKE 'Returned:%'",
    )
    .fetch_one(env.pool())
    .await
    .unwrap();
    assert!(body.contains("Remarks: Missing SLP data"));
    assert!(body.contains(&format!(
        "https://reports.example.org/submissions/submission/{}/",
        submission.id
    )));

    // Charlie's profile has no notification address.
    env.submitted("head_charlie", "Q1").await;
    assert_eq!(pending_notifications(&env).await.len(), 2);
}
