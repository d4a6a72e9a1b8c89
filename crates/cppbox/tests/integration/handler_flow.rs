use std::time::Duration;

use cppbox::{Handler, LimitOverrides, ResponseStatus, Submission};
use tokio_util::sync::CancellationToken;

use super::{assert_no_leaked_workspaces, fixture_source, test_config};

fn submission(source: &str) -> Submission {
    Submission {
        source: source.to_owned(),
        stdin: None,
        flags: Vec::new(),
        limits: LimitOverrides::default(),
    }
}

fn fixture_submission(name: &str) -> Submission {
    submission(&String::from_utf8(fixture_source(name)).expect("fixture is valid UTF-8"))
}

#[tokio::test]
async fn trivial_program_returns_ok() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let response = handler.handle(submission("int main(){return 0;}")).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.exit_code, Some(0));
    assert!(response.stdout.is_empty());
    assert!(response.stderr.is_empty());
    assert!(!response.truncated.stdout);
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn syntax_error_returns_compile_error() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let response = handler.handle(fixture_submission("compile_error.cpp")).await;

    assert_eq!(response.status, ResponseStatus::CompileError);
    assert!(!response.compiler_output.is_empty());
    assert!(response.exit_code.is_none());
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn infinite_loop_returns_timeout() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let mut sub = fixture_submission("infinite_loop.cpp");
    sub.limits.time_ms = Some(1000);

    let response = handler.handle(sub).await;

    assert_eq!(response.status, ResponseStatus::Timeout);
    assert!(response.exit_code.is_none());
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn over_allocation_returns_runtime_error() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let mut sub = fixture_submission("mem_hog.cpp");
    sub.limits.memory_mb = Some(64);

    let response = handler.handle(sub).await;

    assert_eq!(response.status, ResponseStatus::RuntimeError);
    assert!(response.exit_code.is_none());
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn oversized_output_is_flagged_truncated() {
    let config = test_config();
    let handler = Handler::new(config.clone());
    let cap_bytes = config
        .default_limits
        .max_output
        .expect("default output cap")
        * 1024;

    let response = handler.handle(fixture_submission("big_output.cpp")).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert!(response.truncated.stdout);
    assert_eq!(response.stdout.len() as u64, cap_bytes);
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn stdin_round_trips_through_the_handler() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let mut sub = fixture_submission("echo_stdin.cpp");
    sub.stdin = Some("hello sandbox\n".to_owned());

    let response = handler.handle(sub).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.stdout, "hello sandbox\n");
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn warnings_surface_without_failing_the_run() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let mut sub = fixture_submission("warning.cpp");
    sub.flags = vec!["-Wall".to_owned()];

    let response = handler.handle(sub).await;

    assert_eq!(response.status, ResponseStatus::Ok);
    assert!(response.compiler_output.contains("unused"));
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn cancellation_kills_the_run_and_cleans_up() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        // Long enough for compilation to finish and the loop to start
        tokio::time::sleep(Duration::from_secs(4)).await;
        trigger.cancel();
    });

    // A generous run limit so the cancellation, not the wall clock, ends it
    let mut sub = fixture_submission("infinite_loop.cpp");
    sub.limits.time_ms = Some(15_000);

    let response = handler.handle_with_cancel(sub, cancel).await;

    // The surrounding runtime's deadline surfaces as a timeout
    assert_eq!(response.status, ResponseStatus::Timeout);
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn identical_submissions_yield_identical_results() {
    let config = test_config();
    let handler = Handler::new(config.clone());

    let mut sub = fixture_submission("echo_stdin.cpp");
    sub.stdin = Some("stable\n".to_owned());

    let first = handler.handle(sub.clone()).await;
    let second = handler.handle(sub).await;

    assert_eq!(first.status, second.status);
    assert_eq!(first.exit_code, second.exit_code);
    assert_eq!(first.stdout, second.stdout);
    assert_no_leaked_workspaces(&config);
}

#[tokio::test]
async fn preflight_finds_the_compiler() {
    let handler = Handler::new(test_config());
    assert!(handler.preflight().is_some());
}
