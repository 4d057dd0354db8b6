// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `metatron serve` command implementation.
//!
//! Builds the user store, the Avernus backend, and the Telegram channel,
//! constructs the one [`Scheduler`] every surface shares, spawns the queue
//! processor, and runs the surfaces until a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;

use metatron_avernus::AvernusBackend;
use metatron_config::MetatronConfig;
use metatron_core::{
    ChannelAdapter, GenerationBackend, HealthStatus, MetatronError, PluginAdapter, UserStateStore,
};
use metatron_jobs::{Dispatcher, JobContext, JobSettings};
use metatron_queue::{AdmissionPolicy, Scheduler};
use metatron_storage::JsonUserStore;
use metatron_telegram::TelegramChannel;
use metatron_twitch::TwitchBridge;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::shutdown;

pub fn admission_policy(config: &MetatronConfig) -> AdmissionPolicy {
    AdmissionPolicy::new(config.queue.max_user_queue)
        .with_max_total_depth(config.queue.max_total_depth)
        .with_bucketing(config.twitch.bucketing())
}

/// Runs the `metatron serve` command.
pub async fn run_serve(config: MetatronConfig) -> Result<(), MetatronError> {
    init_tracing(&config.agent.log_level, config.agent.log_file.as_deref());
    info!(name = %config.agent.name, "metatron startup");

    let store: Arc<dyn UserStateStore> = Arc::new(JsonUserStore::new(&config.history.users_dir));
    let backend: Arc<dyn GenerationBackend> = Arc::new(AvernusBackend::new(&config.avernus)?);
    let telegram = Arc::new(TelegramChannel::new(config.telegram.clone())?);
    let channel: Arc<dyn ChannelAdapter> = telegram.clone();

    match backend.health_check().await {
        Ok(HealthStatus::Healthy) => info!("avernus reachable"),
        Ok(status) => warn!(?status, "avernus not healthy, jobs will report errors until it is"),
        Err(e) => warn!(error = %e, "avernus health check failed"),
    }

    let policy = admission_policy(&config);
    info!(
        max_user_queue = policy.max_per_identity,
        max_total_depth = ?policy.max_total_depth,
        bucketing = %policy.bucketing,
        "admission policy"
    );
    let (scheduler, processor) = Scheduler::new(policy, store.clone());
    let ctx = JobContext::new(
        backend.clone(),
        store.clone(),
        channel,
        JobSettings::from_config(&config),
    );
    let dispatcher = Dispatcher::new(scheduler, ctx);

    let cancel = shutdown::install_signal_handler();
    let processor_task = tokio::spawn(processor.run(cancel.clone()));

    let twitch_task = if config.twitch.enabled {
        let bridge = TwitchBridge::new(
            config.twitch.clone(),
            dispatcher.clone(),
            telegram.name(),
        )?;
        info!("twitch bridge enabled");
        Some(tokio::spawn(Arc::new(bridge).run(cancel.clone())))
    } else {
        None
    };

    let surface = metatron_telegram::run(
        telegram.bot().clone(),
        dispatcher,
        &config.telegram,
        cancel.clone(),
    );
    let result = supervise(surface, processor_task, &cancel).await;

    if let Some(task) = twitch_task {
        if let Err(e) = task.await {
            error!(error = %e, "twitch bridge task failed");
        }
    }

    let shutdowns = [
        (telegram.name(), telegram.shutdown().await),
        (backend.name(), backend.shutdown().await),
        (store.name(), store.shutdown().await),
    ];
    for (adapter, outcome) in shutdowns {
        if let Err(e) = outcome {
            warn!(adapter, error = %e, "adapter shutdown failed");
        }
    }

    info!("metatron shutdown complete");
    result
}

/// Runs the chat surface until it returns or the queue processor stops.
///
/// Whichever ends first cancels everything else. A processor that stops
/// while no shutdown was requested is fatal, since nothing submitted after
/// it would ever run.
async fn supervise<S>(
    surface: S,
    mut processor: JoinHandle<()>,
    cancel: &CancellationToken,
) -> Result<(), MetatronError>
where
    S: Future<Output = Result<(), MetatronError>>,
{
    tokio::pin!(surface);
    tokio::select! {
        result = &mut surface => {
            if let Err(e) = &result {
                error!(error = %e, "telegram surface failed");
            }
            cancel.cancel();
            if let Err(e) = processor.await {
                error!(error = %e, "queue processor task failed");
            }
            result
        }
        joined = &mut processor => {
            let requested = cancel.is_cancelled();
            cancel.cancel();
            let surface_result = surface.await;
            if requested {
                return surface_result;
            }
            if let Err(e) = surface_result {
                warn!(error = %e, "telegram surface failed while stopping");
            }
            let reason = match joined {
                Ok(()) => "queue processor stopped unexpectedly".to_string(),
                Err(e) => format!("queue processor task failed: {e}"),
            };
            error!(reason = %reason, "stopping metatron");
            Err(MetatronError::Internal(reason))
        }
    }
}

/// Installs the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. A log file, when configured,
/// receives the same events without ANSI colours.
fn init_tracing(log_level: &str, log_file: Option<&str>) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("metatron={log_level},warn")));

    let file_layer = log_file.and_then(|path| {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            ),
            Err(e) => {
                eprintln!("warning: cannot open log file {path}: {e}");
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_names(false))
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use metatron_core::ExternalBucketing;

    use super::*;

    #[test]
    fn policy_follows_config() {
        let config = metatron_config::load_and_validate_str(
            r#"
[queue]
max_user_queue = 3
max_total_depth = 50

[twitch]
shared_bucket = false
"#,
        )
        .unwrap();
        let policy = admission_policy(&config);
        assert_eq!(policy.max_per_identity, 3);
        assert_eq!(policy.max_total_depth, Some(50));
        assert_eq!(policy.bucketing, ExternalBucketing::PerPrincipal);
    }

    #[tokio::test]
    async fn dead_processor_stops_the_surface() {
        let cancel = CancellationToken::new();
        let processor = tokio::spawn(async {});
        let surface = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                Ok(())
            }
        };
        let result = supervise(surface, processor, &cancel).await;
        assert!(matches!(result, Err(MetatronError::Internal(_))));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn panicked_processor_is_reported() {
        let cancel = CancellationToken::new();
        let processor = tokio::spawn(async { panic!("queue machinery broke") });
        let surface = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                Ok(())
            }
        };
        let err = supervise(surface, processor, &cancel).await.unwrap_err();
        assert!(err.to_string().contains("queue processor task failed"));
    }

    #[tokio::test]
    async fn surface_exit_stops_the_processor() {
        let cancel = CancellationToken::new();
        let processor = tokio::spawn({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        });
        let result = supervise(async { Ok(()) }, processor, &cancel).await;
        assert!(result.is_ok());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn requested_shutdown_is_not_an_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let processor = tokio::spawn(async {});
        let surface = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                tokio::task::yield_now().await;
                Ok(())
            }
        };
        assert!(supervise(surface, processor, &cancel).await.is_ok());
    }

    #[test]
    fn default_policy_shares_external_bucket() {
        let policy = admission_policy(&MetatronConfig::default());
        assert_eq!(policy.max_per_identity, 2);
        assert_eq!(policy.max_total_depth, None);
        assert_eq!(policy.bucketing, ExternalBucketing::Shared);
    }
}
