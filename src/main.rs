use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use chainwatch_detector::api::{self, AppState};
use chainwatch_detector::broadcast::ChannelSink;
use chainwatch_detector::config::Config;
use chainwatch_detector::error::SchedulerError;
use chainwatch_detector::events::Event;
use chainwatch_detector::pipeline::AlertPipeline;
use chainwatch_detector::tasks::{self, Executor, TaskKind, TaskPriority};
use chainwatch_detector::telemetry;

const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = match config_path.as_deref() {
        Some(path) => Config::load(path)?,
        None if Path::new("config.toml").exists() => Config::load("config.toml")?,
        None => Config::default(),
    };

    telemetry::init(config.logging.format)?;
    tracing::info!(
        config = config_path.as_deref().unwrap_or("config.toml (or defaults)"),
        "ChainWatch Detector starting"
    );

    // Initialize the detection pipeline with the built-in rules
    let sink = Arc::new(ChannelSink::new(config.broadcast.channel_capacity));
    let mut alerts_rx = sink.subscribe();
    let pipeline = Arc::new(AlertPipeline::from_config(&config, sink.clone())?);
    tracing::info!(
        patterns = pipeline.registry().len(),
        window_ms = pipeline.window_ms(),
        "Detection pipeline initialized"
    );

    let (executor, mut reports) = tasks::build_executor(&config.scheduler, pipeline.clone());

    // Alerts go to stdout as NDJSON
    tokio::spawn(async move {
        loop {
            match alerts_rx.recv().await {
                Ok(alert) => match serde_json::to_string(&alert) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize alert"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Alert output lagging, dropped alerts");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            if report.outcome.is_success() {
                tracing::debug!(
                    task_id = %report.task_id,
                    alerts = report.outcome.alerts().len(),
                    "Task completed"
                );
            } else {
                tracing::warn!(task_id = %report.task_id, outcome = ?report.outcome, "Task failed");
            }
        }
    });

    // Spawn API server
    if config.api.enabled {
        let state = AppState {
            pipeline: pipeline.clone(),
            executor: Some(executor.clone()),
        };
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(state, &host, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        });
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        signal.cancel();
    });

    tracing::info!("Reading events from stdin. Press Ctrl+C to stop.");
    ingest_stdin(executor.as_ref(), &shutdown).await?;
    wait_idle(executor.as_ref(), &shutdown).await;

    tracing::info!("Stopping scheduler...");
    executor.shutdown().await;

    let stats = executor.stats();
    tracing::info!(
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        alerts = pipeline.alerts().len(),
        "ChainWatch Detector stopped gracefully"
    );
    Ok(())
}

/// Queue one task per NDJSON line until EOF or shutdown.
async fn ingest_stdin(executor: &dyn Executor, shutdown: &CancellationToken) -> eyre::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!(lines = line_no, "End of input");
            break;
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<serde_json::Value>(&line)
            .map_err(|e| e.to_string())
            .and_then(|raw| Event::from_json(&raw).map_err(|e| e.to_string()))
        {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping invalid event");
                continue;
            }
        };

        submit(executor, event, shutdown).await?;
    }

    Ok(())
}

/// Wait for every accepted task to report, unless shutdown comes first.
async fn wait_idle(executor: &dyn Executor, shutdown: &CancellationToken) {
    loop {
        let stats = executor.stats();
        if stats.completed + stats.failed >= stats.submitted {
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
}

/// Retry with exponential backoff while the queue is full.
async fn submit(executor: &dyn Executor, event: Event, shutdown: &CancellationToken) -> eyre::Result<()> {
    let mut backoff = Duration::from_millis(10);
    loop {
        match executor.queue_task(TaskKind::Single(event.clone()), TaskPriority::Medium) {
            Ok(_) => return Ok(()),
            Err(SchedulerError::QueueFull { capacity, .. }) => {
                tracing::debug!(capacity, backoff_ms = backoff.as_millis() as u64, "Queue full, backing off");
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
