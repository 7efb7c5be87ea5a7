use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use eval_pulse::client::{self, HttpStatusClient, StaticToken, StatusSource};
use eval_pulse::config::{self, EvalPulseConfig, TOKEN_ENV};
use eval_pulse::feed::RandomFeed;
use eval_pulse::log::LogLevel;
use eval_pulse::log_buffer::LogEntry;
use eval_pulse::projection::{self, DetailPage, ErrorBanner, SubmissionDetailView};
use eval_pulse::shutdown::{install_signal_handlers, spawn_shutdown_monitor};
use eval_pulse::simulator::{spawn_simulator, Simulator, SimulatorView};
use eval_pulse::synchronizer::{spawn_synchronizer, SyncEvent, Synchronizer};
use eval_pulse::types::{Stage, Submission};
use eval_pulse::{log_info, log_warn};

const MAX_SIMULATED_SUBMISSIONS: u32 = 500;

#[derive(Parser)]
#[command(name = "eval-pulse", about = "Live status of submission evaluation batches")]
struct Cli {
    /// Working directory holding eval-pulse.toml (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/eval-pulse.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a project until every submission is completed or failed
    Watch {
        /// Project ID
        project: String,
    },
    /// Fetch a project's status once
    Status {
        /// Project ID
        project: String,
    },
    /// Reset every submission of a project and queue it for processing again
    Reevaluate {
        /// Project ID
        project: String,
        /// Keep watching after the batch has been queued
        #[arg(long)]
        watch: bool,
    },
    /// Show the content extracted from one submission
    Slides {
        /// Submission ID
        submission: String,
    },
    /// Run the local processing view against a synthetic batch
    Simulate {
        /// Number of synthetic submissions
        #[arg(long, default_value = "12")]
        submissions: u32,
        /// Seed for a reproducible run (overrides simulator.seed)
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.log_level.parse::<LogLevel>() {
        Ok(level) => eval_pulse::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let result = match config::load_config_from(cli.config.as_deref(), &cli.root) {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: EvalPulseConfig) -> Result<(), String> {
    match command {
        Commands::Watch { project } => handle_watch(&config, &project).await,
        Commands::Status { project } => handle_status(&config, &project).await,
        Commands::Reevaluate { project, watch } => {
            handle_reevaluate(&config, &project, watch).await
        }
        Commands::Slides { submission } => handle_slides(&config, &submission).await,
        Commands::Simulate { submissions, seed } => {
            handle_simulate(&config, submissions, seed.or(config.simulator.seed)).await
        }
    }
}

fn build_client(config: &EvalPulseConfig) -> Result<HttpStatusClient, String> {
    let token = std::env::var(TOKEN_ENV).unwrap_or_default();
    if token.trim().is_empty() {
        log_warn!("[pre] {} is not set; requests will be rejected", TOKEN_ENV);
    }
    let client = HttpStatusClient::new(
        &config.api.base_url,
        Arc::new(StaticToken::new(token)),
        config.request_timeout(),
    )?;
    log_info!("[pre] Backend: {}", client.base_url());
    Ok(client)
}

async fn handle_watch(config: &EvalPulseConfig, project_id: &str) -> Result<(), String> {
    install_signal_handlers()?;
    let source = Arc::new(build_client(config)?);
    watch_project(config, source, project_id).await
}

async fn watch_project<S: StatusSource + 'static>(
    config: &EvalPulseConfig,
    source: Arc<S>,
    project_id: &str,
) -> Result<(), String> {
    let cancel = CancellationToken::new();
    let monitor = spawn_shutdown_monitor(cancel.clone());

    let sync = Synchronizer::new(project_id, config.sync_config());
    let (handle, mut events, task) = spawn_synchronizer(source, sync, cancel.clone());

    let mut printed_logs: Option<LogEntry> = None;
    let mut banner: Option<ErrorBanner> = None;

    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::Updated(_) | SyncEvent::Completed(_) => {
                let completed = matches!(event, SyncEvent::Completed(_));
                if let Ok(state) = handle.view().await {
                    printed_logs = print_new_logs(&state.logs, printed_logs.take());
                    print_detail_page(&projection::detail_page(&state));
                }
                if completed {
                    println!("Batch finished.");
                    handle.stop();
                }
            }
            SyncEvent::FetchFailed(e) => {
                let now = Utc::now();
                let visible = banner.as_ref().is_some_and(|b| b.is_visible(now));
                if !visible {
                    let fresh = ErrorBanner::new(&e, now, config.banner_dismiss());
                    println!("! {}", fresh.text);
                    banner = Some(fresh);
                }
            }
            SyncEvent::Stopped => break,
        }
    }

    handle.stop();
    let final_state = task.join().await;
    cancel.cancel();
    let _ = monitor.await;

    match final_state {
        Some(state) => {
            log_info!("[sync] {} ended in state {:?}", project_id, state.state);
            Ok(())
        }
        None => Err("Status watcher ended unexpectedly".to_string()),
    }
}

async fn handle_status(config: &EvalPulseConfig, project_id: &str) -> Result<(), String> {
    let source = build_client(config)?;
    let mut sync = Synchronizer::new(project_id, config.sync_config());
    sync.start();
    sync.poll_once(&source).await?;

    if let Some(e) = &sync.poll_state().last_error {
        return Err(e.to_string());
    }

    let state = sync.detail_state();
    print_new_logs(&state.logs, None);
    print_detail_page(&projection::detail_page(&state));
    Ok(())
}

async fn handle_reevaluate(
    config: &EvalPulseConfig,
    project_id: &str,
    watch: bool,
) -> Result<(), String> {
    let source = Arc::new(build_client(config)?);
    let started = client::reevaluate(source.as_ref(), project_id).await?;
    println!(
        "{} ({} queued)",
        if started.message.is_empty() {
            "Processing started"
        } else {
            started.message.as_str()
        },
        started.queued
    );

    if watch {
        install_signal_handlers()?;
        watch_project(config, source, project_id).await?;
    }
    Ok(())
}

async fn handle_slides(config: &EvalPulseConfig, submission_id: &str) -> Result<(), String> {
    let source = build_client(config)?;
    let slides = source.submission_slides(submission_id).await?;

    // No stage context here; show whatever has been extracted.
    match projection::submission_detail(Stage::Completed, &slides) {
        SubmissionDetailView::Slides { heading, cards } => {
            println!("{}", heading);
            for card in cards {
                match card.complexity {
                    Some(complexity) => println!("\n{} ({})", card.title, complexity),
                    None => println!("\n{}", card.title),
                }
                println!("{}", card.text);
            }
        }
        SubmissionDetailView::Extracting { message }
        | SubmissionDetailView::ExtractionFailed { message }
        | SubmissionDetailView::Empty { message } => println!("{}", message),
    }
    Ok(())
}

async fn handle_simulate(
    config: &EvalPulseConfig,
    submissions: u32,
    seed: Option<u64>,
) -> Result<(), String> {
    if submissions == 0 || submissions > MAX_SIMULATED_SUBMISSIONS {
        return Err(format!(
            "--submissions must be between 1 and {}",
            MAX_SIMULATED_SUBMISSIONS
        ));
    }
    install_signal_handlers()?;

    let feed = match seed {
        Some(seed) => RandomFeed::seeded(seed, config.simulator.max_step, config.simulator.log_probability),
        None => RandomFeed::from_os_rng(config.simulator.max_step, config.simulator.log_probability),
    };
    let simulator = Simulator::new(feed, synthetic_batch(submissions), config.console.capacity);

    let cancel = CancellationToken::new();
    let monitor = spawn_shutdown_monitor(cancel.clone());
    let handle = spawn_simulator(simulator, config.tick(), cancel.clone());

    let mut views = handle.subscribe();
    let mut printed_logs: Option<LogEntry> = None;
    let mut last_percent = None;
    println!("{}", projection::run_header(false));

    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        printed_logs = print_new_logs(&view.logs, printed_logs.take());
        if last_percent != Some(view.snapshot.progress_percent) {
            last_percent = Some(view.snapshot.progress_percent);
            print_processing_view(&view);
        }
        if view.finished {
            break;
        }
    }

    let final_view = handle.finished().await;
    cancel.cancel();
    let _ = monitor.await;

    if final_view.finished {
        println!(
            "Run complete: {} submissions processed.",
            final_view.processed.len()
        );
    } else {
        println!("Run aborted at {:.0}%.", final_view.percent);
    }
    Ok(())
}

fn synthetic_batch(count: u32) -> Vec<Submission> {
    (1..=count)
        .map(|n| Submission {
            id: format!("sim-{:03}", n),
            team_name: format!("Team {:02}", n),
            file_ref: format!("pitch-{:02}.pptx", n),
            ..Submission::default()
        })
        .collect()
}

/// Print the entries that arrived after `last_seen`; returns the newest entry.
///
/// The buffer evicts old entries, so the position of the last printed entry
/// is looked up again on every call. If it was evicted, everything is new.
fn print_new_logs(entries: &[LogEntry], last_seen: Option<LogEntry>) -> Option<LogEntry> {
    let start = last_seen
        .as_ref()
        .and_then(|seen| entries.iter().rposition(|e| e == seen))
        .map_or(0, |pos| pos + 1);
    for entry in &entries[start..] {
        let line = projection::console_line(entry);
        println!("{} {}", line.time_label, line.message);
    }
    entries.last().cloned().or(last_seen)
}

fn print_detail_page(page: &DetailPage) {
    if !page.title.is_empty() {
        println!("== {} ==", page.title);
    }
    let stats: Vec<String> = page
        .stats
        .iter()
        .map(|card| match &card.sub {
            Some(sub) => format!("{}: {} ({})", card.label, card.value, sub),
            None => format!("{}: {}", card.label, card.value),
        })
        .collect();
    println!("{}", stats.join(" | "));
    if let Some(caption) = &page.indicator.caption {
        println!("{}", caption);
    }

    println!(
        "{:<4} {:<12} {:<28} {:>6} {:>9}",
        "#", "STATUS", "TEAM", "SLIDES", "SIZE"
    );
    println!("{}", "-".repeat(63));
    for row in &page.rows {
        println!(
            "{:<4} {:<12} {:<28} {:>6} {:>9}",
            row.index,
            row.badge.label,
            truncate(&row.title, 28),
            row.slides,
            row.size_label
        );
        if let Some(reason) = &row.failure_reason {
            println!("     {}", reason);
        }
    }
}

fn print_processing_view(view: &SimulatorView) {
    let ring = projection::progress_ring(view.snapshot.progress_percent, view.stage);
    let stats: Vec<String> = projection::processing_stats(&view.snapshot)
        .iter()
        .map(|card| format!("{}: {}", card.label, card.value))
        .collect();
    println!(
        "{:>4} {:<14} {}",
        ring.percent_label,
        ring.stage_label,
        stats.join(" | ")
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
