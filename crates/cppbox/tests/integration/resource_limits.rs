use std::time::{Duration, Instant};

use cppbox::{
    CompileAndRunRequest, ExecutionStatus, LimitCause, ResourceLimits, Runner, WorkspaceManager,
};
use tokio_util::sync::CancellationToken;

use super::{fixture_source, test_config};

#[tokio::test]
async fn infinite_loop_is_killed_within_the_limit() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("infinite_loop.cpp");
    let limits = ResourceLimits::none()
        .with_time_limit(1.0)
        .with_wall_time_limit(1.0);
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: Some(&limits),
    };

    let started = Instant::now();
    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert_eq!(result.status, ExecutionStatus::TimeLimitExceeded);
    assert!(
        matches!(result.cause, LimitCause::WallTime | LimitCause::CpuTime),
        "unexpected cause: {:?}",
        result.cause
    );
    // Wall time covers compile + run; the run itself must stop near 1s
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(result.wall_time < Duration::from_secs(3));

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn over_allocation_is_classified_as_memory_limit() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("mem_hog.cpp");
    // 64 MB ceiling; the program tries to touch 4 GB
    let limits = ResourceLimits::none()
        .with_wall_time_limit(10.0)
        .with_memory_limit(64 * ResourceLimits::MB);
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: Some(&limits),
    };

    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert_eq!(result.status, ExecutionStatus::MemoryLimitExceeded);
    assert_eq!(result.cause, LimitCause::Memory);

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn output_capture_stops_exactly_at_the_cap() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("big_output.cpp");
    // 4 KB capture cap; the program writes ~1.1 MB
    let limits = ResourceLimits::none()
        .with_wall_time_limit(10.0)
        .with_max_output(4);
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: Some(&limits),
    };

    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert_eq!(result.stdout.len(), 4096);
    assert!(result.stdout_truncated);
    assert!(!result.stderr_truncated);
    // Capping does not kill the child
    assert_eq!(result.status, ExecutionStatus::Ok);
    assert_eq!(result.exit_code, Some(0));

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn generous_custom_limits_do_not_interfere() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("hello.cpp");
    let limits = ResourceLimits::none()
        .with_time_limit(10.0)
        .with_memory_limit(128 * ResourceLimits::MB);
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: Some(&limits),
    };

    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert!(result.is_success());
    assert!(result.wall_time < Duration::from_secs(10));

    workspace.release().await.expect("Failed to release");
}
