//! Main entry point for the `pipecat-load` binary
//!
//! Resolves settings (defaults, YAML, environment, flags), builds the real or
//! loopback collaborators and runs one load pattern to completion.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

use orchestrator::{AudioClip, Collaborators, LoadOrchestrator, LoadPattern, LoopbackBot, LoopbackScript, Progress};
use shared::{ProcessId, Settings, logging, process_debug, process_info};

/// Load tester for pipecat voice bots
#[derive(Parser)]
#[command(name = "pipecat-load")]
#[command(about = "Drives concurrent RTVI websocket sessions against a pipecat bot and reports the results")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(ClapArgs)]
pub struct CommonArgs {
    /// Bot host, e.g. localhost:8000 or https://bot.example.com
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// 16-bit PCM WAV file to stream (a sine tone is generated otherwise)
    #[arg(short = 'a', long, global = true)]
    pub audio: Option<PathBuf>,

    /// Where to write the JSON report
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// YAML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Run against the in-process loopback bot instead of the network
    #[arg(long, global = true)]
    pub loopback: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Hold a fixed number of connections for a duration
    Sustained {
        /// Number of concurrent connections
        #[arg(short = 'n', long)]
        connections: Option<usize>,

        /// Test duration in seconds
        #[arg(short = 'd', long)]
        duration: Option<f64>,
    },
    /// Spawn growing batches of connections
    Ramp {
        /// First batch size
        #[arg(long)]
        start: usize,

        /// Last batch size
        #[arg(long)]
        end: usize,

        /// Batch size increment
        #[arg(long)]
        step: usize,

        /// Seconds between batches
        #[arg(long)]
        interval: f64,

        /// Seconds each connection streams (defaults to the interval)
        #[arg(short = 'd', long)]
        duration: Option<f64>,
    },
    /// Open all connections at once
    Spike {
        /// Number of connections
        #[arg(short = 'n', long)]
        connections: Option<usize>,

        /// Test duration in seconds
        #[arg(short = 'd', long)]
        duration: Option<f64>,
    },
}

fn resolve_settings(common: &CommonArgs) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(common.config.as_deref()).context("loading settings")?;

    if let Some(host) = &common.host {
        settings.host = host.clone();
    }
    if let Some(audio) = &common.audio {
        settings.audio_file = Some(audio.clone());
    }
    if let Some(output) = &common.output {
        settings.default_output = output.clone();
    }
    if let Some(level) = &common.log_level {
        settings.log_level = level.clone();
    }
    if common.verbose {
        settings.log_level = "debug".to_string();
    }

    let problems = settings.validate();
    if !problems.is_empty() {
        anyhow::bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
    }
    Ok(settings)
}

fn pattern_for(command: &Command, settings: &Settings) -> LoadPattern {
    let secs = |value: Option<f64>| shared::config::secs(value.unwrap_or(settings.default_duration));
    match command {
        Command::Sustained { connections, duration } => LoadPattern::Sustained {
            connections: connections.unwrap_or(settings.default_connections),
            duration: secs(*duration),
        },
        Command::Spike { connections, duration } => LoadPattern::Spike {
            connections: connections.unwrap_or(settings.default_connections),
            duration: secs(*duration),
        },
        Command::Ramp {
            start,
            end,
            step,
            interval,
            duration,
        } => LoadPattern::Ramp {
            start: *start,
            end: *end,
            step: *step,
            interval: shared::config::secs(*interval),
            batch_duration: duration.map(shared::config::secs),
        },
    }
}

fn print_progress(progress: Progress) {
    match progress {
        Progress::Elapsed { elapsed, total } => {
            let fraction = if total.is_zero() {
                1.0
            } else {
                (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
            };
            let filled = (fraction * 30.0) as usize;
            eprint!(
                "\r[{}{}] {:>6.1}s / {:.1}s",
                "#".repeat(filled),
                " ".repeat(30 - filled),
                elapsed.as_secs_f64(),
                total.as_secs_f64()
            );
            let _ = std::io::stderr().flush();
            if elapsed >= total {
                eprintln!();
            }
        }
        Progress::Step { current, total } => eprintln!("Step {current}/{total}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = resolve_settings(&args.common)?;

    ProcessId::init_load_tester();
    logging::init_tracing(Some(&settings.log_level));
    logging::log_startup(ProcessId::current(), "pipecat load tester");

    let pattern = pattern_for(&args.command, &settings);
    process_debug!(ProcessId::current(), "Pattern: {:?}", pattern);

    let audio = Arc::new(AudioClip::from_settings(&settings)?);
    process_info!(
        ProcessId::current(),
        "🎧 Audio: {:.2}s at {} Hz, {} byte chunks",
        audio.duration(),
        audio.sample_rate(),
        audio.chunk_size_bytes()
    );

    let collaborators = if args.common.loopback {
        process_info!(ProcessId::current(), "🔁 Loopback mode: no network traffic");
        let bot = LoopbackBot::new(LoopbackScript {
            transcription_every: 10,
            ..LoopbackScript::default()
        });
        Collaborators::loopback(bot, audio)
    } else {
        Collaborators::real(&settings, audio)?
    };

    let output = settings.default_output.clone();
    let host = settings.host.clone();
    let orchestrator = LoadOrchestrator::new(Arc::new(settings), host, collaborators).with_progress(Arc::new(print_progress));

    // Ctrl+C aborts the run; the report below is still produced
    let abort = orchestrator.abort_token();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                abort.cancel();
            }
            Err(err) => {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
            }
        }
    });

    let summary = orchestrator.run(&pattern).await?;
    process_debug!(ProcessId::current(), "Outcomes: {:?}", summary);

    let report = orchestrator.report().await?;

    std::fs::write(&output, report.to_json_pretty()?).with_context(|| format!("writing {}", output.display()))?;
    println!("{}", report.render_summary());
    logging::log_success(ProcessId::current(), &format!("Report written to {}", output.display()));
    Ok(())
}
