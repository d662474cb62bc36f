use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use screenloop_core::assets::AssetRoot;
use screenloop_core::{Step, Workflow, validate_workflow};
use screenloop_engine::{
    EngineConfig, ExecutorEvent, FailurePolicy, RunControl, RunOutcome, WorkflowExecutor,
};
use screenloop_vision::XcapScreen;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ── CLI ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "screenloop", about = "Run screen automation workflows")]
struct Cli {
    /// Directory for the rolling JSON log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow until it finishes or is interrupted
    Run(RunArgs),
    /// Parse and check a workflow without running it
    Validate {
        /// Workflow JSON file
        workflow: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Workflow JSON file
    workflow: PathBuf,

    /// Engine config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// What a list does after a failed step: stop or continue
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Directory templates are resolved against (default: the workflow's)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Device pixel ratio, instead of what the monitor reports
    #[arg(long)]
    scale: Option<f64>,

    /// Test-run only the named step
    #[arg(long)]
    step: Option<String>,
}

// ── Setup ───────────────────────────────────────────────────────

fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("screenloop")
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to create log file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_filter = EnvFilter::new("trace");

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(file_filter),
        )
        .init();

    Ok(guard)
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow: {}", path.display()))?;
    let workflow: Workflow = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse workflow: {}", path.display()))?;
    validate_workflow(&workflow)
        .with_context(|| format!("Invalid workflow: {}", path.display()))?;
    Ok(workflow)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml_edit::de::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn find_step_named<'a>(steps: &'a [Step], name: &str) -> Option<&'a Step> {
    steps.iter().find_map(|step| {
        if step.name == name {
            Some(step)
        } else {
            find_step_named(&step.children, name)
        }
    })
}

/// Relative templates resolve against `--assets`, else the workflow's folder.
fn asset_root(args: &RunArgs) -> PathBuf {
    args.assets
        .clone()
        .or_else(|| args.workflow.parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."))
}

// ── Run ─────────────────────────────────────────────────────────

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let workflow = load_workflow(&args.workflow)?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(policy) = args.failure_policy {
        config.failure_policy = policy;
    }

    let single_step = match args.step.as_deref() {
        Some(name) => match find_step_named(&workflow.steps, name) {
            Some(step) => Some(step.clone()),
            None => bail!("No step named '{}' in {}", name, args.workflow.display()),
        },
        None => None,
    };

    let screen = match args.scale {
        Some(ratio) => XcapScreen::with_scale(ratio),
        None => XcapScreen::new(),
    };
    let (event_tx, events) = unbounded_channel();
    let executor = WorkflowExecutor::new(workflow, config, event_tx)
        .with_screen(screen)
        .with_assets(AssetRoot::new(asset_root(&args)));
    let control = executor.control();

    let outcome = match single_step {
        Some(step) => {
            let worker = tokio::task::spawn_blocking(move || executor.run_step(&step));
            watch_events(events, &control, stdin_lines(), tokio::signal::ctrl_c()).await;
            worker.await.context("Step test run panicked")?
        }
        None => {
            let handle = executor.spawn().context("Failed to start worker thread")?;
            watch_events(events, &control, stdin_lines(), tokio::signal::ctrl_c()).await;
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .context("Failed to join worker thread")?
        }
    };

    info!("Outcome: {:?}", outcome);
    Ok(match outcome {
        RunOutcome::Succeeded => ExitCode::SUCCESS,
        RunOutcome::Failed => ExitCode::from(1),
        RunOutcome::Stopped => ExitCode::from(130),
        RunOutcome::Faulted => ExitCode::from(2),
    })
}

/// Presents events until `Finished`. `interrupt` resolving stops the run;
/// input requests are answered from `input`, one line each.
async fn watch_events<R, I>(
    mut events: UnboundedReceiver<ExecutorEvent>,
    control: &Arc<RunControl>,
    mut input: Lines<R>,
    interrupt: I,
) where
    R: AsyncBufRead + Unpin,
    I: Future<Output = io::Result<()>>,
{
    tokio::pin!(interrupt);
    let mut interrupted = false;
    let mut awaiting_input = false;

    loop {
        tokio::select! {
            biased;

            result = &mut interrupt, if !interrupted => {
                interrupted = true;
                match result {
                    Ok(()) => {
                        warn!("Interrupted, stopping");
                        control.stop();
                    }
                    Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
                }
            }
            line = input.next_line(), if awaiting_input => {
                awaiting_input = false;
                match line {
                    Ok(Some(line)) => control.provide_input(line),
                    Ok(None) => {
                        warn!("stdin closed while waiting for input, stopping");
                        control.stop();
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        control.stop();
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match present(event) {
                    Presented::Shown => {}
                    Presented::InputRequested => awaiting_input = true,
                    Presented::Finished => break,
                }
            }
        }
    }
}

enum Presented {
    Shown,
    InputRequested,
    Finished,
}

fn present(event: ExecutorEvent) -> Presented {
    match event {
        // Already written to the console by the tracing layer.
        ExecutorEvent::Log(_) => {}
        ExecutorEvent::StateChanged(state) => debug!("Executor state: {:?}", state),
        ExecutorEvent::Progress { index, name, .. } => println!("[{}] {}", index, name),
        ExecutorEvent::Error(msg) => eprintln!("error: {}", msg),
        ExecutorEvent::InputRequested { prompt, variable } => {
            print!("{} [{}]: ", prompt, variable);
            if let Err(e) = std::io::stdout().flush() {
                debug!("Failed to flush prompt: {}", e);
            }
            return Presented::InputRequested;
        }
        ExecutorEvent::Finished(outcome) => {
            println!("Finished: {:?}", outcome);
            return Presented::Finished;
        }
    }
    Presented::Shown
}

fn validate(path: &Path) -> Result<ExitCode> {
    let workflow = load_workflow(path)?;
    println!(
        "{}: '{}' is valid ({} steps)",
        path.display(),
        workflow.name,
        workflow.step_count()
    );
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.log_dir)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate { workflow } => validate(&workflow),
    }
}
