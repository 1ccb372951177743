use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use crunner::config::Config;
use crunner::daemon::{DaemonContext, DaemonRouter};
use crunner::ipc::{DaemonResponse, IpcClient, IpcClientConfig, IpcServer, IpcServerConfig};
use crunner::jobs::JobSnapshot;

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crunner")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("crunner.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let default_level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None | Some(Commands::Serve) => handle_serve_command(config).await.map(|_| 0),
        Some(Commands::Ping) => handle_ping_command(config).await.map(|_| 0),
        Some(Commands::Compile { file }) => handle_compile_command(file, config).await.map(|_| 0),
        Some(Commands::Start { job_id }) => handle_start_command(job_id, config).await.map(|_| 0),
        Some(Commands::Poll { job_id, json }) => handle_poll_command(job_id, *json, config).await.map(|_| 0),
        Some(Commands::Run { file, interval }) => handle_run_command(file, *interval, config).await,
    }
}

async fn handle_serve_command(config: &Config) -> Result<()> {
    let ctx = Arc::new(DaemonContext::new(config).context("Failed to initialize daemon")?);
    let server = Arc::new(IpcServer::with_config(IpcServerConfig::from(&config.server)));
    let router = Arc::new(DaemonRouter::new(Arc::clone(&ctx)));

    println!(
        "{} {} (workspace {})",
        "Listening on".green(),
        server.socket_path().display(),
        ctx.workspace.dir().display()
    );

    let mut serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run(router).await })
    };

    tokio::select! {
        result = &mut serving => {
            ctx.shutdown();
            return result.context("Server task panicked")?.context("Server failed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            println!("{}", "Shutting down...".yellow());
            server.shutdown();
        }
    }

    let result = serving.await.context("Server task panicked")?;
    ctx.shutdown();
    result.context("Server failed")
}

async fn connect(config: &Config) -> Result<IpcClient> {
    let client = IpcClient::new(IpcClientConfig {
        socket_path: config.server.socket_path.clone(),
        request_timeout_ms: config.client.request_timeout_ms,
    });
    client
        .connect()
        .await
        .with_context(|| format!("Is the daemon running? ({})", config.server.socket_path.display()))?;
    Ok(client)
}

/// Turn an error response into an eyre error carrying the daemon's message
fn into_result(response: DaemonResponse) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(eyre!("{} (code {})", error.message, error.code));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

async fn handle_ping_command(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    if !client.ping().await? {
        return Err(eyre!("Daemon at {} rejected ping", client.socket_path().display()));
    }
    println!("{} from {}", "pong".green(), client.socket_path().display());
    Ok(())
}

/// Compile a file and return its job id when the toolchain accepted it
async fn compile_file(client: &IpcClient, file: &Path) -> Result<Option<String>> {
    let source = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let result = into_result(client.compile(&source).await?)?;

    let output = result["output"].as_str().unwrap_or_default();
    if result["success"].as_bool().unwrap_or(false) {
        println!("{}", output.trim_end());
        Ok(result["jobId"].as_str().map(str::to_string))
    } else {
        eprintln!("{}", "Compilation failed:".red());
        eprintln!("{}", output.trim_end());
        Ok(None)
    }
}

async fn handle_compile_command(file: &Path, config: &Config) -> Result<()> {
    let client = connect(config).await?;
    match compile_file(&client, file).await? {
        Some(job_id) => {
            println!("{} {}", "Job:".cyan(), job_id);
            Ok(())
        }
        None => Err(eyre!("{} did not compile", file.display())),
    }
}

async fn handle_start_command(job_id: &str, config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let result = into_result(client.start_run(job_id).await?)?;
    let snapshot: JobSnapshot = serde_json::from_value(result).context("Malformed snapshot")?;
    print_snapshot(&snapshot);
    Ok(())
}

async fn handle_poll_command(job_id: &str, json: bool, config: &Config) -> Result<()> {
    let client = connect(config).await?;
    let result = into_result(client.poll_run(job_id).await?)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    let snapshot: JobSnapshot = serde_json::from_value(result).context("Malformed snapshot")?;
    print_snapshot(&snapshot);
    Ok(())
}

fn print_snapshot(snapshot: &JobSnapshot) {
    let status = if snapshot.is_completed() {
        "completed".green()
    } else {
        "running".yellow()
    };
    println!("{} {} [{}] {}ms", "Job:".cyan(), snapshot.job_id, status, snapshot.elapsed_ms);
    if let Some(code) = snapshot.exit_code {
        println!("{} {}", "Exit code:".cyan(), code);
    }
    if snapshot.timed_out {
        println!("{}", "Timed out".red());
    }
    if snapshot.truncated {
        println!("{}", "Output truncated".yellow());
    }
    if !snapshot.output.is_empty() {
        println!("{}", snapshot.output.trim_end());
    }
}

/// Compile, start and follow a program, returning its exit code
async fn handle_run_command(file: &Path, interval: Option<u64>, config: &Config) -> Result<i32> {
    let client = connect(config).await?;
    let Some(job_id) = compile_file(&client, file).await? else {
        return Ok(1);
    };

    let interval = Duration::from_millis(interval.unwrap_or(config.client.poll_interval_ms));
    let result = into_result(client.start_run(&job_id).await?)?;
    let mut snapshot: JobSnapshot = serde_json::from_value(result).context("Malformed snapshot")?;
    let mut printed = 0;

    loop {
        // Output only grows, so print the unseen suffix
        let mut start = printed.min(snapshot.output.len());
        while !snapshot.output.is_char_boundary(start) {
            start += 1;
        }
        print!("{}", &snapshot.output[start..]);
        std::io::stdout().flush()?;
        printed = snapshot.output.len();

        if snapshot.is_completed() {
            break;
        }

        tokio::time::sleep(interval).await;
        let result = into_result(client.poll_run(&job_id).await?)?;
        snapshot = serde_json::from_value(result).context("Malformed snapshot")?;
    }

    let code = snapshot.exit_code.unwrap_or(1);
    if snapshot.timed_out {
        eprintln!("{} after {}ms", "Timed out".red(), snapshot.elapsed_ms);
    } else if code == 0 {
        eprintln!("{} in {}ms", "Finished".green(), snapshot.elapsed_ms);
    } else {
        eprintln!("{} {} in {}ms", "Exited with".red(), code, snapshot.elapsed_ms);
    }
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(socket) = &cli.socket {
        config.server.socket_path = socket.clone();
    }

    // Setup logging
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let code = run_application(&cli, &config).await.context("Application failed")?;
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
