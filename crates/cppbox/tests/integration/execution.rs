use cppbox::{CompileAndRunRequest, ExecutionStatus, Runner, WorkspaceManager};
use tokio_util::sync::CancellationToken;

use super::{fixture_source, test_config};

#[tokio::test]
async fn compile_and_run_hello_world() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("hello.cpp");
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: None,
    };

    let (outcome, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    assert!(outcome.is_success());
    let result = result.expect("expected an execution result");
    assert!(result.is_success());
    assert_eq!(
        String::from_utf8_lossy(&result.stdout),
        "Hello, World!\n"
    );

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn compile_failure_skips_execution() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("compile_error.cpp");
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: None,
    };

    let (outcome, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run call failed");

    assert!(!outcome.is_success());
    assert!(result.is_none()); // Should not run if compile fails

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn stdin_reaches_the_program() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("echo_stdin.cpp");
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: Some(b"first\nsecond\n"),
        compile_limits: None,
        run_limits: None,
    };

    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert_eq!(String::from_utf8_lossy(&result.stdout), "first\nsecond\n");

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn nonzero_exit_code_is_not_a_failure() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("exit_code.cpp");
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: None,
    };

    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert_eq!(result.status, ExecutionStatus::Ok);
    assert_eq!(result.exit_code, Some(42));
    assert!(!result.is_success());

    workspace.release().await.expect("Failed to release");
}

#[tokio::test]
async fn signal_death_is_a_runtime_classification() {
    let config = test_config();
    let runner = Runner::new(config.clone());
    let manager = WorkspaceManager::new(config.workspace_root.clone());
    let mut workspace = manager.acquire().await.expect("Failed to acquire workspace");

    let source = fixture_source("segfault.cpp");
    let request = CompileAndRunRequest {
        workspace: &workspace,
        source: &source,
        flags: &[],
        stdin: None,
        compile_limits: None,
        run_limits: None,
    };

    let (_, result) = runner
        .compile_and_run(request, &CancellationToken::new())
        .await
        .expect("Compile and run failed");

    let result = result.expect("expected an execution result");
    assert_eq!(result.status, ExecutionStatus::Signaled);
    assert_eq!(result.signal, Some(libc::SIGSEGV));
    assert_eq!(result.exit_code, None);

    workspace.release().await.expect("Failed to release");
}
