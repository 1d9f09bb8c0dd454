mod config;
mod model;
mod poll;
mod ui;
mod view;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{Config, Overrides, API_URL_ENV};
use crossterm::{
	event::{self, Event, KeyCode, KeyEventKind},
	execute,
	terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use poll::{reconcile, Fetcher, HttpBackend, Poller, Snapshot, Source};
use std::fs::OpenOptions;
use std::io::stdout;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::{Chrome, STATUS_STYLES};
use view::ViewModel;

const LOG_STDERR_ENV: &str = "FLEETWATCH_LOG_STDERR";

#[derive(Parser)]
#[command(name = "fleetwatch")]
#[command(about = "Terminal dashboard for a multi-agent fleet backend")]
struct Cli {
	/// Backend base address, e.g. http://127.0.0.1:8080/api
	#[arg(long, global = true, env = API_URL_ENV)]
	api_url: Option<String>,
	/// Poll interval in milliseconds
	#[arg(long, global = true)]
	interval_ms: Option<u64>,
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Run one poll cycle and print the snapshot as JSON
	Status,
	/// Poll without the TUI, printing one summary line per cycle
	Watch {
		/// Stop after this many cycles (runs until Ctrl-C when omitted)
		#[arg(long)]
		cycles: Option<u64>,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let overrides = Overrides {
		api_url: cli.api_url.clone(),
		interval_ms: cli.interval_ms,
	};
	let cfg = config::load_or_init(&overrides).context("failed to load config")?;

	match cli.command {
		Some(Commands::Status) => {
			init_logging(false)?;
			print_status(&cfg).await
		}
		Some(Commands::Watch { cycles }) => {
			init_logging(false)?;
			watch(&cfg, cycles).await
		}
		None => {
			init_logging(true)?;
			run_tui(&cfg).await
		}
	}
}

/// Route `tracing` output. The TUI owns the terminal, so it logs to a file unless
/// `FLEETWATCH_LOG_STDERR` is set.
fn init_logging(tui: bool) -> Result<()> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let stderr_enabled = matches!(
		std::env::var(LOG_STDERR_ENV).ok().as_deref(),
		Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
	);
	if !tui || stderr_enabled {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.try_init();
		return Ok(());
	}

	let path = config::logs_dir()?.join("fleetwatch.log");
	let file = OpenOptions::new()
		.create(true)
		.append(true)
		.open(&path)
		.with_context(|| format!("failed to open log file {}", path.display()))?;
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_ansi(false)
		.with_writer(Mutex::new(file))
		.try_init();
	Ok(())
}

fn build_poller(cfg: &Config) -> Result<Poller<HttpBackend>> {
	let backend = HttpBackend::new(&cfg.backend.base_url, cfg.request_timeout())?;
	info!(base_url = %cfg.backend.base_url, "using backend");
	Ok(Poller::new(Fetcher::new(backend), cfg.poll_interval()))
}

async fn print_status(cfg: &Config) -> Result<()> {
	let backend = HttpBackend::new(&cfg.backend.base_url, cfg.request_timeout())?;
	let results = Fetcher::new(backend).fetch_all().await;
	for source in results.failed_sources() {
		if let Some(err) = results.error(source) {
			warn!(%source, error = %err, "source failed");
		}
	}
	let snapshot = reconcile(&Snapshot::empty(), results, Utc::now());
	println!("{}", serde_json::to_string_pretty(&snapshot)?);
	Ok(())
}

async fn watch(cfg: &Config, cycles: Option<u64>) -> Result<()> {
	let poller = build_poller(cfg)?;
	let mut rx = poller.subscribe();
	poller.start();

	loop {
		tokio::select! {
			changed = rx.changed() => {
				if changed.is_err() {
					break;
				}
				let snapshot = rx.borrow_and_update().clone();
				println!("{}", summary_line(&snapshot));
				if cycles.is_some_and(|n| snapshot.cycle >= n) {
					break;
				}
			}
			_ = tokio::signal::ctrl_c() => {
				info!("interrupted");
				break;
			}
		}
	}

	poller.shutdown().await;
	Ok(())
}

fn summary_line(snapshot: &Snapshot) -> String {
	let sections: Vec<String> = Source::ALL
		.iter()
		.map(|s| {
			let mark = if snapshot.status(*s).is_fresh() { "ok" } else { "stale" };
			format!("{s}={mark}")
		})
		.collect();
	format!(
		"cycle {} live={} running={} pipelines={}/{}/{} logs={} [{}]",
		snapshot.cycle,
		snapshot.stats.live_agents,
		snapshot.stats.running_agents,
		snapshot.pipelines.running.len(),
		snapshot.pipelines.queued.len(),
		snapshot.pipelines.completed.len(),
		snapshot.logs.len(),
		sections.join(" "),
	)
}

async fn run_tui(cfg: &Config) -> Result<()> {
	let poller = build_poller(cfg)?;
	let rx = poller.subscribe();
	poller.start();

	enable_raw_mode()?;
	let mut stdout_handle = stdout();
	execute!(stdout_handle, EnterAlternateScreen)?;
	let backend = ratatui::backend::CrosstermBackend::new(stdout_handle);
	let mut terminal = ratatui::Terminal::new(backend)?;

	let mut style_idx = STATUS_STYLES
		.iter()
		.position(|s| *s == cfg.display.status_style)
		.unwrap_or(0);
	let mut status_message: Option<(String, Instant)> = None;

	let result: Result<()> = loop {
		if status_message
			.as_ref()
			.map(|(_, ts)| ts.elapsed() >= Duration::from_secs(3))
			.unwrap_or(false)
		{
			status_message = None;
		}

		// One whole snapshot per frame; the poller swaps it atomically.
		let vm = ViewModel::new(rx.borrow().clone(), cfg.display.capacity);
		let chrome = Chrome {
			status_style: STATUS_STYLES[style_idx],
			label_width: cfg.display.label_width,
			max_log_lines: cfg.display.max_log_lines,
			poll_state: poller.state(),
			counters: poller.counters(),
			status_message: status_message.as_ref().map(|(m, _)| m.as_str()),
			now: Utc::now(),
		};
		if let Err(e) = terminal.draw(|f| ui::draw(f, &vm, &chrome)) {
			break Err(e.into());
		}

		// Blocks the main (block_on) thread only; poller tasks run on the worker pool.
		match event::poll(Duration::from_millis(100)) {
			Ok(false) => continue,
			Ok(true) => {}
			Err(e) => break Err(e.into()),
		}
		let key = match event::read() {
			Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
			Ok(_) => continue,
			Err(e) => break Err(e.into()),
		};
		match key.code {
			KeyCode::Char('q') | KeyCode::Esc => break Ok(()),
			KeyCode::Char('r') => {
				poller.refresh_now();
				status_message = Some(("refresh requested".to_string(), Instant::now()));
			}
			KeyCode::Char('s') => {
				style_idx = (style_idx + 1) % STATUS_STYLES.len();
				status_message = Some((
					format!("status style: {}", STATUS_STYLES[style_idx]),
					Instant::now(),
				));
			}
			_ => {}
		}
	};

	// Let an in-flight cycle land before tearing down.
	poller.shutdown().await;
	teardown_terminal()?;
	result
}

fn teardown_terminal() -> Result<()> {
	disable_raw_mode()?;
	execute!(stdout(), LeaveAlternateScreen)?;
	Ok(())
}
