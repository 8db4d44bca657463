use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tessel_config::HostConfig;
use tessel_host::Host;
use tessel_task_host::{TaskExecutor, TaskInput};
use tessel_tasks::TaskRegistry;

/// Tessel - sandboxed tasks with host-granted HTTP
#[derive(Parser)]
#[command(name = "tessel")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the host config file (default: ~/.tessel/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a task, reading its payload from stdin
  Run {
    /// Name of the task to run
    task: String,

    /// Additional host pattern the task may reach (repeatable)
    #[arg(long = "allow-host")]
    allow_hosts: Vec<String>,

    /// Invocation timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
  },

  /// List available tasks
  Tasks,
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();

  match cli.command {
    Some(Commands::Run {
      task,
      allow_hosts,
      timeout_ms,
    }) => {
      let mut config = load_config(cli.config.as_deref())?;
      config.http.allowed_hosts.extend(allow_hosts);
      if timeout_ms.is_some() {
        config.timeout_ms = timeout_ms;
      }
      run_task(task, config)
    }
    Some(Commands::Tasks) => {
      for name in TaskRegistry::builtin().names() {
        println!("{name}");
      }
      Ok(ExitCode::SUCCESS)
    }
    None => {
      println!("tessel - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

/// Explicit path, else `~/.tessel/config.json` if present, else defaults.
fn load_config(path: Option<&Path>) -> Result<HostConfig> {
  if let Some(path) = path {
    return HostConfig::load(path)
      .with_context(|| format!("failed to load config: {}", path.display()));
  }

  let default_path = dirs::home_dir().map(|home| home.join(".tessel").join("config.json"));
  match default_path {
    Some(path) if path.exists() => HostConfig::load(&path)
      .with_context(|| format!("failed to load config: {}", path.display())),
    _ => Ok(HostConfig::default()),
  }
}

fn run_task(task_id: String, config: HostConfig) -> Result<ExitCode> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_task_async(task_id, config).await })
}

async fn run_task_async(task_id: String, config: HostConfig) -> Result<ExitCode> {
  let registry = TaskRegistry::builtin();
  let task = registry.get(&task_id)?;

  let request = read_payload_from_stdin()?;

  let host = Host::from_config(&config, Handle::current()).context("failed to create host")?;
  let executor = TaskExecutor::new(host).with_default_timeout_ms(config.timeout_ms);

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling task");
      on_interrupt.cancel();
    }
  });

  let input = TaskInput {
    task_id,
    execution_id: uuid::Uuid::new_v4().to_string(),
    request: request.into(),
    timeout_ms: None,
  };
  let run = executor
    .execute(task, input, cancel)
    .await
    .context("task execution failed")?;

  match run.result {
    Ok(output) => {
      let mut stdout = io::stdout().lock();
      stdout.write_all(&output)?;
      if !output.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
      }
      Ok(ExitCode::SUCCESS)
    }
    Err(message) => {
      eprintln!("task error: {message}");
      Ok(ExitCode::FAILURE)
    }
  }
}

fn read_payload_from_stdin() -> Result<Vec<u8>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, empty payload
    return Ok(Vec::new());
  }

  let mut input = Vec::new();
  io::stdin()
    .read_to_end(&mut input)
    .context("failed to read payload from stdin")?;
  Ok(input)
}
