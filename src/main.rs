mod cli_logger;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use eqperf::{
    Config, DEFAULT_CONFIG_FILE, MtProfiler, NodeId, ReportEntry, ReportFormat, Reporter, Session,
    SessionPath, StProfiler, ThreadReport, children_total, replay_single, replay_threaded,
};

use crate::cli_logger::CliLogger;

#[derive(Debug, Parser)]
#[command(name = "eqperf", version, about = "Call-tree profiler session tools")]
struct Cli {
    /// Config file (defaults to ./eqperf.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Machine-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a recorded session and print the call-tree report.
    Replay {
        #[arg(value_name = "SESSION")]
        session: PathBuf,
        /// One thread per stream instead of a single merged stream.
        #[arg(long)]
        threaded: bool,
        /// Entries per tree level; 0 keeps all.
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        format: Option<ReportFormat>,
        /// Write the report here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check that every stream in a session starts and finishes regions in pairs.
    Check {
        #[arg(value_name = "SESSION")]
        session: PathBuf,
    },
    /// Print an example session file.
    Example,
    /// Show the effective configuration.
    Config,
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum ReplayReport {
    Single {
        session: String,
        top: usize,
        total: u64,
        entries: Vec<ReportEntry>,
    },
    Threaded {
        session: String,
        top: usize,
        threads: Vec<ThreadReport>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let logger = CliLogger::new(cli.json, cli.no_color);
    match run(&cli, &logger) {
        Ok(code) => code,
        Err(err) => {
            logger.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(Config::load_optional(Path::new(DEFAULT_CONFIG_FILE))),
    }
}

fn run(cli: &Cli, logger: &CliLogger) -> Result<ExitCode> {
    let config = load_config(cli)?;
    match &cli.command {
        Command::Replay {
            session,
            threaded,
            top,
            format,
            out,
        } => {
            let session = Session::load(&SessionPath::new(session.clone()))
                .with_context(|| format!("loading session {}", session.display()))?;
            for check in session.check().iter().filter(|c| !c.is_balanced()) {
                logger.print_warning(&format!(
                    "stream {:?} is unbalanced ({} unmatched, {} open, {} cleared open); \
                     report structure may be inaccurate",
                    check.stream,
                    check.unmatched_finishes,
                    check.open_at_end,
                    check.clears_while_open
                ));
            }

            let top = top.unwrap_or(config.top);
            let format = format.unwrap_or(if cli.json {
                ReportFormat::Json
            } else {
                config.format
            });
            let report = replay(&session, *threaded, top)?;
            let rendered = render(&report, format, &Reporter::from_config(&config))?;

            match out {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, &rendered)
                        .with_context(|| format!("writing report {}", path.display()))?;
                    tracing::info!(path = %path.display(), "report written");
                }
                None if format == ReportFormat::Json => println!("{}", rendered.trim_end()),
                None => logger.print_report(
                    &format!("eqperf replay {} ({} events)", session.name, session.event_count()),
                    &rendered,
                ),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Check { session } => {
            let session = Session::load(&SessionPath::new(session.clone()))
                .with_context(|| format!("loading session {}", session.display()))?;
            let checks = session.check();
            logger.print_checks(&session.name, &checks)?;
            if checks.iter().all(|c| c.is_balanced()) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Example => {
            println!("{}", serde_json::to_string_pretty(&Session::example())?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Config => {
            logger.print_serialized(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn replay(session: &Session, threaded: bool, top: usize) -> Result<ReplayReport> {
    if threaded {
        let profiler = MtProfiler::new();
        replay_threaded(session, &profiler)?;
        return Ok(ReplayReport::Threaded {
            session: session.name.clone(),
            top,
            threads: profiler.report(top),
        });
    }

    let mut profiler = StProfiler::new();
    replay_single(session, &mut profiler);
    Ok(ReplayReport::Single {
        session: session.name.clone(),
        top,
        total: children_total(profiler.tree(), NodeId::ROOT),
        entries: profiler.report(top),
    })
}

fn render(report: &ReplayReport, format: ReportFormat, reporter: &Reporter) -> Result<String> {
    if format == ReportFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }
    let text = match report {
        ReplayReport::Single { entries, .. } => reporter.render_entries(entries)?,
        ReplayReport::Threaded { threads, .. } => reporter.render_threads(threads)?,
    };
    Ok(text)
}
