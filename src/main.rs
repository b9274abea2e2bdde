mod backoff;
mod buffer;
mod cli;
mod config;
mod dispatcher;
mod error;
mod input;
mod limiter;
mod logging;
mod openai;
mod sink;
mod task;
mod ui;

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use buffer::ResultBuffer;
use cli::{Cli, Command};
use config::BatchConfig;
use dispatcher::{Dispatcher, RunSummary};
use openai::OpenAiClient;
use sink::JsonlSink;
use ui::BatchProgress;

/// Exit status when the run finished but not every item succeeded.
const EXIT_PARTIAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_PARTIAL),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary> {
    let mut config = BatchConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    config.validate()?;
    if config.api_key.is_empty() {
        warn!("no API key configured; set OPENAI_API_KEY or api_key in batchgen.toml");
    }

    let shutdown = shutdown_signal().context("failed to install signal handlers")?;

    let items = match &cli.command {
        Command::Run {
            input,
            prompt_field,
            limit,
        } => input::load_items(input, prompt_field, *limit)?,
        Command::Generate { prompt, count } => input::repeat_prompt(prompt, *count),
    };

    info!(
        base_url = %config.base_url,
        model = %config.model,
        "initializing inference client"
    );
    let client = OpenAiClient::with_base_url(
        config.api_key.clone(),
        &config.base_url,
        config.generation_params(&cli.command),
        config.request_timeout(),
    )
    .context("failed to build inference client")?;

    let sink = JsonlSink::open(&cli.output)?;
    info!(output = %sink.path().display(), "appending results");
    let buffer = ResultBuffer::new(sink, config.flush_threshold);

    let total = items.len() as u64;
    let mut progress = if cli.quiet {
        BatchProgress::hidden(total)
    } else {
        BatchProgress::start(total)
    };

    let dispatcher = Dispatcher::new(Arc::new(client), &config.dispatch_settings());
    info!(run_id = dispatcher.run_id(), "starting batch");
    let summary = dispatcher
        .run(items, &buffer, &mut progress, shutdown)
        .await?;

    progress.finish(&summary);
    Ok(summary)
}

/// Resolves on Ctrl-C or SIGTERM. Handlers are registered before returning,
/// so a signal that arrives before the future is first polled is not lost.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("received SIGINT"),
            _ = terminate.recv() => info!("received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
}
