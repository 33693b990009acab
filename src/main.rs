use std::{process, sync::Arc};

use cache_stnsd::{
    application::error::AppError,
    cache::{CacheConfig, CacheStore, StatusProbe},
    config,
    infra::{
        health::HealthMonitor,
        http::{self, ProxyState},
        pidfile::PidFile,
        prefetch::Prefetcher,
        shutdown, telemetry,
    },
    upstream::{FailureLockout, TlsMaterial, UpstreamClient, UpstreamConfig},
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Server(config::ServerArgs::default()));

    match command {
        config::Command::Version => {
            println!("cache-stnsd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        config::Command::Server(_) => {
            telemetry::init(&settings.logging)?;
            run_server(settings).await
        }
    }
}

async fn run_server(settings: config::Settings) -> Result<(), AppError> {
    if settings.source.found {
        info!(
            target = "cache_stnsd::config",
            path = %settings.source.path.display(),
            "configuration loaded"
        );
    } else {
        warn!(
            target = "cache_stnsd::config",
            path = %settings.source.path.display(),
            "configuration file not found; using defaults"
        );
    }

    let _pid_file = settings
        .pid_file
        .as_deref()
        .map(PidFile::create)
        .transpose()?;

    let tls = TlsMaterial::load(&settings.upstream.tls)?;
    let upstream = Arc::new(UpstreamClient::new(UpstreamConfig::from_settings(
        &settings.upstream,
        tls,
    ))?);

    let cache_config = CacheConfig::from(&settings.cache);
    let probe = Arc::new(StatusProbe::new());
    let cache = Arc::new(CacheStore::new(&cache_config, probe.clone()));
    let lockout = Arc::new(FailureLockout::new(settings.upstream.lock_duration));

    let (trigger, shutdown_signal) = shutdown::channel();
    let signal_handle = tokio::spawn(shutdown::wait_for_signal(trigger));

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    if cache_config.enabled {
        background.push(tokio::spawn(
            HealthMonitor::new(upstream.clone(), probe, cache.clone()).run(
                settings.server.health_check_interval,
                shutdown_signal.clone(),
            ),
        ));

        if settings.cache.prefetch {
            background.push(tokio::spawn(
                Prefetcher::new(upstream.clone(), cache.clone(), cache_config.ttl).run(
                    cache_config.prefetch_interval(),
                    shutdown_signal.clone(),
                ),
            ));
        }
    }

    info!(
        target = "cache_stnsd",
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %settings.upstream.endpoint,
        cache = cache_config.enabled,
        prefetch = cache_config.enabled && settings.cache.prefetch,
        "starting cache-stnsd"
    );

    let router = http::build_router(ProxyState {
        upstream,
        cache,
        lockout,
        cache_config,
    });

    let result = http::serve(
        &settings.server.unix_socket,
        router,
        shutdown_signal,
        settings.server.graceful_shutdown,
    )
    .await;

    signal_handle.abort();
    let _ = signal_handle.await;

    for handle in background {
        handle.abort();
        let _ = handle.await;
    }

    result.map_err(AppError::from)
}
