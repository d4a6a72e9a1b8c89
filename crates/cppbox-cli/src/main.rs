//! Cppbox CLI
//!
//! A command-line tool for compiling and running C++ submissions in the
//! cppbox sandbox.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cppbox::{Config, EXAMPLE_CONFIG, Handler, LimitOverrides, ResponseStatus, Submission};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cppbox")]
#[command(about = "A sandbox for compiling and running untrusted C++")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: cppbox.toml)
        #[arg(short, long, default_value = "cppbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Compile and run a C++ source file
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Input file fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Compiler flags (must be on the allow-list)
        #[arg(short, long = "flag")]
        flags: Vec<String>,

        /// Execution time limit in milliseconds
        #[arg(short, long)]
        time_ms: Option<u64>,

        /// Memory limit in MB
        #[arg(short, long)]
        memory_mb: Option<u64>,
    },

    /// Read one JSON submission from stdin (or a file) and print the JSON response
    Invoke {
        /// Read the submission from this file instead of stdin
        #[arg(value_name = "FILE")]
        payload: Option<PathBuf>,
    },

    /// Check that the configured compiler is available
    Check,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            input,
            flags,
            time_ms,
            memory_mb,
        } => run_file(config, &source, input.as_deref(), flags, time_ms, memory_mb).await,
        Commands::Invoke { payload } => invoke(config, payload.as_deref()).await,
        Commands::Check => check(config),
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_file(
    config: Config,
    source: &PathBuf,
    input: Option<&std::path::Path>,
    flags: Vec<String>,
    time_ms: Option<u64>,
    memory_mb: Option<u64>,
) -> Result<()> {
    let source_text = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let stdin = match input {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .context("failed to read input file")?,
        ),
        None => None,
    };

    let handler = Handler::new(config);
    info!("running submission");

    let response = handler
        .handle(Submission {
            source: source_text,
            stdin,
            flags,
            limits: LimitOverrides { time_ms, memory_mb },
        })
        .await;

    if !response.compiler_output.is_empty() {
        eprintln!("{}", response.compiler_output);
    }
    print!("{}", response.stdout);
    if !response.stderr.is_empty() {
        eprint!("{}", response.stderr);
    }

    info!(
        status = ?response.status,
        duration_ms = response.duration_ms,
        exit_code = response.exit_code,
        truncated_stdout = response.truncated.stdout,
        "invocation finished"
    );

    match response.status {
        ResponseStatus::Ok => {
            let code = response.exit_code.unwrap_or(0);
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        ResponseStatus::CompileError => std::process::exit(2),
        ResponseStatus::RuntimeError => std::process::exit(3),
        ResponseStatus::Timeout => std::process::exit(4),
        ResponseStatus::InternalError => {
            if let Some(error) = response.error {
                eprintln!("error: {error}");
            }
            std::process::exit(5)
        }
    }
}

/// One-shot invocation: JSON submission in, JSON response out.
///
/// This is the shape the serverless transport drives; the same payloads work
/// here for local testing.
async fn invoke(config: Config, payload: Option<&std::path::Path>) -> Result<()> {
    let raw = match payload {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .context("failed to read payload file")?,
        None => {
            use tokio::io::AsyncReadExt;
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("failed to read payload from stdin")?;
            buffer
        }
    };

    let submission: Submission =
        serde_json::from_str(&raw).context("failed to parse submission payload")?;

    let handler = Handler::new(config);
    let response = handler.handle(submission).await;

    println!(
        "{}",
        serde_json::to_string(&response).context("failed to serialize response")?
    );
    Ok(())
}

fn check(config: Config) -> Result<()> {
    let handler = Handler::new(config);
    match handler.preflight() {
        Some(path) => {
            println!("compiler available: {}", path.display());
            Ok(())
        }
        None => {
            let command = handler.config().compiler.command.first().cloned();
            eprintln!(
                "compiler '{}' not found on sandbox PATH '{}'",
                command.unwrap_or_default(),
                handler.config().sandbox.path
            );
            std::process::exit(1)
        }
    }
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root.display());
    println!("Sandbox PATH: {}", config.sandbox.path);
    println!("Deny network: {}", config.sandbox.deny_network);
    println!();
    println!("Compiler command: {}", config.compiler.command.join(" "));
    println!("Source name: {}", config.compiler.source_name);
    println!("Output name: {}", config.compiler.output_name);
    println!("Allowed flags: {}", config.compiler.allowed_flags.join(" "));
    println!();
    println!("Default execution limits:");
    println!("  Time limit: {:?} s", config.default_limits.time_limit);
    println!(
        "  Wall time limit: {:?} s",
        config.default_limits.wall_time_limit
    );
    println!(
        "  Memory limit: {:?} KB",
        config.default_limits.memory_limit
    );
    println!("  Output cap: {:?} KB", config.default_limits.max_output);
    println!();
    println!("Request caps:");
    println!("  Max source: {} bytes", config.request.max_source_bytes);
    println!("  Max stdin: {} bytes", config.request.max_stdin_bytes);
    println!("  Max time override: {} ms", config.request.max_time_ms);
    println!("  Max memory override: {} MB", config.request.max_memory_mb);
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
