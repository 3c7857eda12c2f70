//! Crewdeck - multi-tenant workspace management API
//!
//! Serves the dashboard backend: workspaces, members, invitations, API
//! keys and webhook configuration, delegating identity to the external
//! identity provider and delivery to the webhook relay.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crewdeck::{
    api, config,
    config::LogFormat,
    db,
    middleware::{auth_rate_limit_config, RateLimitState},
    models::RoleTable,
    services::{
        CacheStore, DirectoryService, IdentityClient, MemoryCache, RedisCache, RelayClient,
        SessionResolver, SessionStore,
    },
    AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Crewdeck {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know the log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program to
    // ensure log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("Crewdeck starting up");

    info!("Initializing database connection");
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    // Cache store: Redis when configured; in-memory otherwise. A failed
    // Redis connection degrades to memory rather than blocking startup,
    // since the cache is an optimization.
    let cache = match config.cache.redis_url.as_deref() {
        Some(url) => match RedisCache::connect(url).await {
            Ok(backend) => {
                info!("Connected to Redis cache store");
                CacheStore::new(Arc::new(backend))
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, using in-memory cache; \
                       sessions will not survive restarts");
                CacheStore::new(Arc::new(MemoryCache::new(config.cache.max_entries)))
            }
        },
        None => {
            info!("No Redis URL configured, using in-memory cache");
            CacheStore::new(Arc::new(MemoryCache::new(config.cache.max_entries)))
        }
    };

    let identity =
        IdentityClient::new(&config.identity).context("Failed to initialize identity client")?;
    let relay = RelayClient::new(&config.relay).context("Failed to initialize relay client")?;

    let roles = Arc::new(RoleTable::builtin());
    info!("Role table initialized with {} built-in roles", roles.roles().len());

    let directory = Arc::new(DirectoryService::new(identity, cache.clone(), &config.cache));
    let sessions = SessionStore::new(
        cache.clone(),
        std::time::Duration::from_secs(config.session.ttl_secs),
    );
    let resolver = SessionResolver::new(directory.clone(), roles.clone());

    let state = AppState {
        config: config.clone(),
        db,
        cache,
        directory,
        relay,
        roles,
        sessions,
        resolver,
    };

    let rate_limit = RateLimitState::new(auth_rate_limit_config());

    let cors = if config.server.cors_allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = config
            .server
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = api::router(state, Some(rate_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(CompressionLayer::new());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;

    match &log_config.target {
        LogTarget::Console => {
            let subscriber = tracing_subscriber::registry().with(env_filter);
            match log_config.format {
                LogFormat::Json => subscriber.with(fmt::layer().json().with_target(true)).init(),
                LogFormat::Compact => subscriber
                    .with(fmt::layer().compact().with_target(false))
                    .init(),
                LogFormat::Pretty => subscriber.with(fmt::layer().with_target(true)).init(),
            }
            None
        }
        LogTarget::File => {
            let (writer, guard) = create_file_writer(log_config);
            let subscriber = tracing_subscriber::registry().with(env_filter);
            match log_config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .init(),
                _ => subscriber
                    .with(fmt::layer().compact().with_writer(writer).with_ansi(false))
                    .init(),
            }
            Some(guard)
        }
        LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            let subscriber = tracing_subscriber::registry().with(env_filter);
            match log_config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().json().with_target(true))
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .init(),
                _ => subscriber
                    .with(fmt::layer().with_target(true))
                    .with(fmt::layer().compact().with_writer(writer).with_ansi(false))
                    .init(),
            }
            Some(guard)
        }
    }
}

/// Create a non-blocking file writer with daily rotation
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender =
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix);
    tracing_appender::non_blocking(file_appender)
}

fn print_help() {
    println!("Crewdeck {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Multi-tenant workspace management API");
    println!();
    println!("USAGE:");
    println!("    crewdeck [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    Configuration is read from config.yaml (or CREWDECK_CONFIG),");
    println!("    with CREWDECK_* environment variables taking precedence.");
}
