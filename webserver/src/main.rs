//! Main entry point for the `pipecat-testing-api` binary
//!
//! Serves the interactive session API against a real bot, or against the
//! in-process loopback bot with `--loopback`.

use anyhow::Context;
use clap::Parser;
use orchestrator::{LoopbackBot, LoopbackScript};
use shared::{ProcessId, Settings, logging, process_info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use webserver::{SessionManager, WebServer};

#[derive(Parser, Debug)]
#[command(name = "pipecat-testing-api")]
#[command(about = "HTTP API for interactive pipecat bot sessions")]
struct Args {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP server
    #[arg(long)]
    port: Option<u16>,

    /// Default bot host for new sessions
    #[arg(long)]
    bot_host: Option<String>,

    /// YAML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Answer every session with the in-process loopback bot
    #[arg(long)]
    loopback: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn resolve_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;

    if let Some(host) = &args.host {
        settings.api_host = host.clone();
    }
    if let Some(port) = args.port {
        settings.api_port = port;
    }
    if let Some(bot_host) = &args.bot_host {
        settings.host = bot_host.clone();
    }
    if let Some(level) = &args.log_level {
        settings.log_level = level.clone();
    }

    let problems = settings.validate();
    if !problems.is_empty() {
        anyhow::bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let process_id = ProcessId::init_testing_api();

    let settings = resolve_settings(&args)?;
    logging::init_tracing(Some(&settings.log_level));

    let addr: SocketAddr = format!("{}:{}", settings.api_host, settings.api_port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", settings.api_host, settings.api_port))?;
    logging::log_startup(
        process_id,
        &format!(
            "bot {} | max sessions {} | idle timeout {}s",
            settings.host, settings.max_sessions, settings.session_timeout
        ),
    );

    let settings = Arc::new(settings);
    let sessions = if args.loopback {
        process_info!(process_id, "🔁 serving sessions from the loopback bot");
        let bot = LoopbackBot::new(LoopbackScript {
            transcription_every: 10,
            ..LoopbackScript::default()
        });
        SessionManager::loopback(settings, bot)
    } else {
        SessionManager::real(settings)?
    };

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal");
                on_signal.cancel();
            }
            Err(err) => {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
            }
        }
    });

    WebServer::new(Arc::new(sessions)).run(addr, shutdown).await?;

    logging::log_success(process_id, "Testing API stopped gracefully");
    Ok(())
}
