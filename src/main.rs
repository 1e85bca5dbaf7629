use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use sharelist::{
    application::{
        error::AppError,
        items::ItemService,
        notify::ChangeNotifier,
        repos::{ItemsRepo, LikesRepo},
    },
    cache::{CacheConfig, MemoryCache, RedisCache, SnapshotCache},
    config::{self, CacheBackend, StorageBackend},
    hub::{BroadcastHub, ChangeRelay, HubConfig},
    infra::{
        auth::TokenVerifier,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, HealthState, WsState},
        memory::MemoryRepositories,
        telemetry,
    },
};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging).map_err(AppError::from)?;
            run_serve(settings).await
        }
        config::Command::IssueToken(args) => run_issue_token(&settings, &args),
    }
}

/// Repositories behind the item service, as trait objects over one backend.
struct Store {
    items: Arc<dyn ItemsRepo>,
    likes: Arc<dyn LikesRepo>,
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let tokens = Arc::new(TokenVerifier::from_settings(&settings.auth).map_err(AppError::from)?);
    let store = init_store(&settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = init_cache(&cache_config)?;

    let (notifier, feed) = ChangeNotifier::channel();
    let items = Arc::new(
        ItemService::new(store.items.clone(), store.likes.clone(), notifier)
            .with_cache_opt(cache, cache_config.list_ttl),
    );

    let (hub, hub_handle) = BroadcastHub::spawn(HubConfig::from(&settings.hub));
    let relay_handle = ChangeRelay::new(items.clone(), hub.clone(), feed).spawn();

    let router = http::build_router(
        ApiState {
            items: items.clone(),
            tokens,
        },
        WsState {
            hub,
            ping_interval: settings.hub.ping_interval,
        },
        HealthState {
            store: store.items.clone(),
        },
        &settings.server,
    );

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "sharelist::server",
        addr = %settings.server.addr,
        storage = ?settings.storage.backend,
        cache_enabled = cache_config.enabled,
        "listening"
    );

    let result = serve_until_shutdown(listener, router, settings.server.graceful_shutdown).await;

    relay_handle.abort();
    hub_handle.abort();
    info!(target = "sharelist::server", "server stopped");
    result
}

async fn serve_until_shutdown(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    grace: Duration,
) -> Result<(), AppError> {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            let _ = shutdown_rx.changed().await;
        },
    );
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        _ = shutdown_signal() => {}
    }

    info!(
        target = "sharelist::server",
        grace_seconds = grace.as_secs(),
        "shutdown requested; draining connections"
    );
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "sharelist::server",
                "graceful shutdown timed out; closing remaining connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "sharelist::server", error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "sharelist::server", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn init_store(settings: &config::Settings) -> Result<Store, AppError> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            warn!(
                target = "sharelist::server",
                "using in-memory storage; data is lost on restart"
            );
            let repos = Arc::new(MemoryRepositories::new());
            Ok(Store {
                items: repos.clone(),
                likes: repos,
            })
        }
        StorageBackend::Postgres => {
            let database_url = settings
                .database
                .url
                .as_ref()
                .ok_or_else(|| InfraError::configuration("database url is not configured"))
                .map_err(AppError::from)?;

            let pool =
                PostgresRepositories::connect(database_url, settings.database.max_connections.get())
                    .await
                    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

            let repos = Arc::new(PostgresRepositories::new(pool));
            Ok(Store {
                items: repos.clone(),
                likes: repos,
            })
        }
    }
}

fn init_cache(config: &CacheConfig) -> Result<Option<Arc<dyn SnapshotCache>>, AppError> {
    if !config.enabled {
        return Ok(None);
    }

    let cache: Arc<dyn SnapshotCache> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(config)),
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| InfraError::configuration("cache.redis_url is not configured"))
                .map_err(AppError::from)?;
            Arc::new(
                RedisCache::connect(url)
                    .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?,
            )
        }
    };
    Ok(Some(cache))
}

fn run_issue_token(
    settings: &config::Settings,
    args: &config::IssueTokenArgs,
) -> Result<(), AppError> {
    if args.user_id <= 0 {
        return Err(AppError::unexpected("--user-id must be a positive integer"));
    }
    let verifier = TokenVerifier::from_settings(&settings.auth).map_err(AppError::from)?;
    let ttl = args
        .ttl_hours
        .map(|hours| Duration::from_secs(hours.saturating_mul(3600)))
        .unwrap_or(settings.auth.token_ttl);

    let token = verifier
        .issue_at(args.user_id, time::OffsetDateTime::now_utc(), ttl)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{token}");
    Ok(())
}
