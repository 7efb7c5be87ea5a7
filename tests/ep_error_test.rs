use std::time::Duration;

use eval_pulse::ep_error::EpError;
use eval_pulse::types::Stage;

#[test]
fn fetch_family_is_retryable() {
    assert!(EpError::FetchFailure("HTTP 500: boom".to_string()).is_retryable());
    assert!(EpError::FetchTimeout(Duration::from_secs(10)).is_retryable());
    assert!(EpError::MalformedResponse("missing field".to_string()).is_retryable());
}

#[test]
fn local_and_lifecycle_errors_are_not_retryable() {
    let invalid = EpError::InvalidTransition {
        from: Stage::Completed,
        event: "failure".to_string(),
    };
    assert!(!invalid.is_retryable());
    assert!(!EpError::FetchInFlight.is_retryable());
    assert!(!EpError::NotPolling.is_retryable());
    assert!(!EpError::ShutDown.is_retryable());
}

#[test]
fn invalid_transition_names_stage_and_event() {
    let err = EpError::InvalidTransition {
        from: Stage::Evaluating,
        event: "external status 'visualizing'".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid transition from Evaluating on external status 'visualizing'"
    );
}

#[test]
fn banner_text_is_short_for_fetch_errors() {
    assert_eq!(
        EpError::FetchFailure("HTTP 404: Project not found".to_string()).banner_text(),
        "Could not refresh status: HTTP 404: Project not found"
    );
    assert!(EpError::MalformedResponse("x".to_string())
        .banner_text()
        .contains("retrying"));
}

#[test]
fn converts_into_string_for_cli_results() {
    let message: String = EpError::ShutDown.into();
    assert_eq!(message, "Synchronizer shut down");
}
