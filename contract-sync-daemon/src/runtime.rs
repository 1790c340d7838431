use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use contract_sync::{Pipeline, SyncOptions, SyncResult, SyncResultKind};
use contract_sync_core::config::SyncConfig;

use crate::error::{io_err, DaemonError};
use crate::schedule::SchedulePolicy;

/// Log output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Counts of run outcomes over one `watch` session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    pub runs: usize,
    pub unchanged: usize,
    pub regenerated: usize,
    pub fetch_failed: usize,
    pub generation_failed: usize,
}

impl WatchSummary {
    fn record(&mut self, kind: SyncResultKind) {
        self.runs += 1;
        match kind {
            SyncResultKind::Unchanged => self.unchanged += 1,
            SyncResultKind::Regenerated => self.regenerated += 1,
            SyncResultKind::FetchFailed => self.fetch_failed += 1,
            SyncResultKind::GenerationFailed => self.generation_failed += 1,
        }
    }
}

/// Run `pipeline` on its configured schedule and block until it stops.
pub fn start_blocking(
    config: SyncConfig,
    max_runs: Option<usize>,
) -> Result<WatchSummary, DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(Pipeline::new(config), max_runs))
}

/// Run `pipeline` until Ctrl-C or `max_runs`.
pub async fn run(pipeline: Pipeline, max_runs: Option<usize>) -> Result<WatchSummary, DaemonError> {
    let policy = SchedulePolicy::from_settings(&pipeline.config().schedule);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, stopping watch");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Signal(err.to_string())),
                },
            }
        })
    };

    tracing::info!(
        source = %pipeline.config().source,
        output = %pipeline.config().output.display(),
        interval_secs = policy.interval.as_secs(),
        "watching contract"
    );

    let job = move || {
        let report = pipeline.sync(SyncOptions::default());
        log_report(&report.result, report.duration_ms);
        report.result.kind()
    };
    let result = run_with(policy, job, max_runs, shutdown_tx.subscribe()).await;

    let _ = shutdown_tx.send(());
    match signal_handle.await {
        Ok(inner) => inner?,
        Err(err) => {
            return Err(DaemonError::Join {
                task: "signal_handler",
                message: err.to_string(),
            })
        }
    }
    result
}

/// Scheduler loop: run `job` on the blocking pool, wait per `policy`, repeat.
///
/// Stops when `shutdown` fires or after `max_runs` runs. A shutdown while a
/// run is in flight takes effect once that run has finished.
pub async fn run_with<J>(
    policy: SchedulePolicy,
    job: J,
    max_runs: Option<usize>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<WatchSummary, DaemonError>
where
    J: Fn() -> SyncResultKind + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let mut summary = WatchSummary::default();
    let mut failures: u32 = 0;
    if max_runs == Some(0) {
        return Ok(summary);
    }

    loop {
        let job = Arc::clone(&job);
        let kind = tokio::task::spawn_blocking(move || job())
            .await
            .map_err(|err| DaemonError::Join {
                task: "sync",
                message: err.to_string(),
            })?;

        summary.record(kind);
        failures = if kind.is_success() {
            0
        } else {
            failures.saturating_add(1)
        };

        if max_runs.is_some_and(|max| summary.runs >= max) {
            tracing::info!(runs = summary.runs, "reached max runs");
            break;
        }

        let delay = policy.next_delay(failures);
        tracing::debug!(delay_secs = delay.as_secs(), failures, "next run scheduled");
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Ok(summary)
}

fn log_report(result: &SyncResult, duration_ms: u128) {
    match result {
        SyncResult::Unchanged { fingerprint } => {
            tracing::info!(fingerprint = %fingerprint.short(), duration_ms, "unchanged")
        }
        SyncResult::Regenerated { record, .. } => tracing::info!(
            fingerprint = %record.fingerprint.short(),
            files = record.artifact.files,
            duration_ms,
            "regenerated"
        ),
        SyncResult::FetchFailed { error } => {
            tracing::warn!(error = %error, duration_ms, "fetch-failed")
        }
        SyncResult::GenerationFailed { error } => {
            tracing::warn!(error = %error, duration_ms, "generation-failed")
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default `info`.
///
/// Records emitted through the `log` facade are forwarded as well.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
