//! Integration tests for the core crate.

use signoff_core::api::{ContributionToCheck, TriggerRequest, VisaStatus};
use signoff_core::model::{
    BuildState, Contribution, Credentials, ObservationPhase, PrLessContribution, PullRequest,
    PullRequestContribution, Visa,
};

#[test]
fn test_build_state_serde() {
    let state = BuildState::Cancelled;
    let serialized = serde_json::to_string(&state).unwrap();
    assert_eq!(serialized, r#""cancelled""#);
    let deserialized: BuildState = serde_json::from_str(&serialized).unwrap();
    assert_eq!(deserialized, state);
}

#[test]
fn test_observation_phase_serde_and_display() {
    let phase = ObservationPhase::Observing;
    assert_eq!(serde_json::to_string(&phase).unwrap(), r#""observing""#);
    assert_eq!(phase.to_string(), "observing");
    assert!(!phase.is_terminal());
    assert!(ObservationPhase::Cancelled.is_terminal());
}

#[test]
fn test_contribution_is_tagged() {
    let c = Contribution::PrLess(PrLessContribution {
        pr_number: Some(-10930),
        ticket_key: "IGNITE-10930".into(),
        ticket_status: "Patch Available".into(),
        pr_title: "Cache fix".into(),
    });
    let value = serde_json::to_value(&c).unwrap();
    assert_eq!(value["kind"], "pr_less");
    assert_eq!(value["pr_number"], -10930);
    assert_eq!(c.id(), Some(-10930));
}

#[test]
fn test_contribution_to_check_flattens_contribution() {
    let check = ContributionToCheck {
        contribution: Contribution::PullRequest(PullRequestContribution {
            pr_number: 6224,
            pr_title: "IGNITE-1 fix".into(),
            pr_html_url: "https://github.com/apache/ignite/pull/6224".into(),
            pr_head_commit: "abcdef1".into(),
            pr_time_update: "2019-01-15T12:30:45Z".into(),
            pr_author: "dev".into(),
            pr_author_avatar_url: String::new(),
        }),
        jira_issue_id: Some("IGNITE-1".into()),
        jira_status_name: Some("Patch Available".into()),
        jira_issue_url: None,
        tc_branch_name: Some("pull/6224/head".into()),
    };
    let json = serde_json::to_string(&check).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["kind"], "pull_request");
    assert_eq!(value["pr_number"], 6224);
    assert_eq!(value["tc_branch_name"], "pull/6224/head");

    let back: ContributionToCheck = serde_json::from_str(&json).unwrap();
    assert_eq!(back, check);
}

#[test]
fn test_pull_request_from_source_host_json() {
    let json = r#"{
        "number": 6224,
        "title": "IGNITE-1 fix",
        "html_url": "https://github.com/apache/ignite/pull/6224",
        "updated_at": "2019-01-15T12:30:45Z",
        "head": {"ref": "ignite-1", "sha": "ABCDEF0123456789"},
        "user": {"login": "dev", "avatar_url": "https://avatars/dev"}
    }"#;
    let pr: PullRequest = serde_json::from_str(json).unwrap();
    assert_eq!(pr.head_ref(), Some("ignite-1"));
    assert_eq!(pr.last_commit_sha_short().as_deref(), Some("abcdef0"));

    let c = PullRequestContribution::from(&pr);
    assert_eq!(c.pr_author, "dev");
    assert_eq!(c.pr_head_commit, "abcdef0");
}

#[test]
fn test_trigger_request_defaults_and_suite_list() {
    let req: TriggerRequest = serde_json::from_str(
        r#"{"server_id":"apache","branch":"pull/1/head","parent_suite_id":"RunAll","suite_ids":"RunAll, Cache ,,"}"#,
    )
    .unwrap();
    assert!(!req.observe);
    assert!(!req.top);
    assert!(req.ticket_id.is_none());
    assert_eq!(req.suite_id_list(), vec!["RunAll".to_string(), "Cache".to_string()]);
}

#[test]
fn test_credentials_token_is_not_serialized() {
    let creds = Credentials {
        user_name: "dev".into(),
        token: Some("secret".into()),
    };
    let json = serde_json::to_string(&creds).unwrap();
    assert!(!json.contains("secret"));
}

#[test]
fn test_visa_outcomes() {
    let failed = Visa::failed("JIRA wasn't commented - no finished builds to analyze.");
    assert!(!failed.is_success());
    assert_eq!(failed.blockers, 0);

    let status = VisaStatus {
        status: "running".into(),
        ..Default::default()
    };
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["status"], "running");
    assert!(value["cancel_url"].is_null());
}
