//! geckos3 - single-node S3-compatible object storage on a local filesystem

use axum::extract::DefaultBodyLimit;
use axum::{middleware, routing::get, Router};
use clap::Parser;
use geckos3::api::auth::{sigv4_auth_middleware, AuthConfig};
use geckos3::api::handlers::{
    bucket_get_handler, create_bucket, delete_bucket, delete_object, delete_objects, get_object,
    head_bucket, head_object, head_root, health_check, list_buckets, method_not_allowed,
    post_object, put_object_or_copy, service_not_implemented, AppState,
};
use geckos3::config::Config;
use geckos3::storage::{gc, FsStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bound on concurrent in-flight requests.
const MAX_IN_FLIGHT: usize = 1024;

/// Whole-request budget; generous because multi-gigabyte uploads and
/// downloads are expected to flow through a single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(4 * 3600);

/// Drain window after a shutdown signal before the process force-exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Version string including build timestamp for --version output
fn version_long() -> &'static str {
    // e.g. "0.4.1 (built 2026-07-28T09:12:44Z)"
    static V: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    V.get_or_init(|| {
        format!(
            "{} (built {})",
            env!("CARGO_PKG_VERSION"),
            env!("GECKOS3_BUILD_TIME"),
        )
    })
}

/// S3-compatible object storage server backed by a local directory
#[derive(Parser, Debug)]
#[command(name = "geckos3")]
#[command(version = version_long())]
#[command(author, about, long_about = None)]
struct Cli {
    /// Data directory; buckets become its subdirectories
    #[arg(
        long,
        value_name = "DIR",
        env = "GECKOS3_DATA_DIR",
        default_value = "./data"
    )]
    data_dir: PathBuf,

    /// Listen address
    #[arg(
        short,
        long,
        value_name = "ADDR",
        env = "GECKOS3_LISTEN",
        default_value = "127.0.0.1:9000"
    )]
    listen: SocketAddr,

    /// SigV4 access key ID (required with --auth)
    #[arg(long, value_name = "KEY", env = "GECKOS3_ACCESS_KEY")]
    access_key: Option<String>,

    /// SigV4 secret access key (required with --auth)
    #[arg(long, value_name = "SECRET", env = "GECKOS3_SECRET_KEY")]
    secret_key: Option<String>,

    /// Require SigV4 authentication on every request
    #[arg(
        long,
        env = "GECKOS3_AUTH",
        default_value_t = false,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    auth: bool,

    /// Write per-object metadata sidecars (off: attributes come from stat)
    #[arg(
        long,
        env = "GECKOS3_METADATA",
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    metadata: bool,

    /// fsync object data and parent directories on commit
    #[arg(
        long,
        env = "GECKOS3_FSYNC",
        default_value_t = false,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    fsync: bool,

    /// Seconds between multipart GC sweeps
    #[arg(
        long,
        value_name = "SECS",
        env = "GECKOS3_MULTIPART_GC_INTERVAL",
        default_value_t = 3600
    )]
    multipart_gc_interval: u64,

    /// Age in seconds past which an abandoned multipart upload is reaped
    #[arg(
        long,
        value_name = "SECS",
        env = "GECKOS3_MULTIPART_MAX_AGE",
        default_value_t = 86_400
    )]
    multipart_max_age: u64,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            listen_addr: self.listen,
            data_dir: self.data_dir,
            access_key_id: self.access_key,
            secret_access_key: self.secret_key,
            auth: self.auth,
            metadata: self.metadata,
            fsync: self.fsync,
            multipart_gc_interval: Duration::from_secs(self.multipart_gc_interval),
            multipart_max_age: Duration::from_secs(self.multipart_max_age),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Priority: RUST_LOG > GECKOS3_LOG > default
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("GECKOS3_LOG").map(EnvFilter::new))
        .unwrap_or_else(|_| EnvFilter::new("geckos3=info,tower_http=warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.into_config();
    config.validate()?;

    info!(
        "Starting geckos3 v{} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GECKOS3_BUILD_TIME"),
    );
    info!("  Listen address: {}", config.listen_addr);
    info!("  Data directory: {:?}", config.data_dir);
    info!("  Metadata sidecars: {}", config.metadata);
    info!("  fsync on commit: {}", config.fsync);

    if config.auth_enabled() {
        info!(
            "  Authentication: SigV4 ENABLED (access key: {})",
            config.access_key_id.as_deref().unwrap_or("")
        );
    } else {
        warn!("  Authentication: DISABLED (open access); pass --auth with --access-key/--secret-key to enable");
    }

    let store = FsStore::new(config.data_dir.clone(), config.metadata, config.fsync).await?;
    let data_root = store.resolver().root().to_path_buf();

    // Background reaper for abandoned multipart staging directories.
    let gc_task = gc::spawn(
        data_root,
        config.multipart_gc_interval,
        config.multipart_max_age,
    );

    let state = Arc::new(AppState {
        store: Arc::new(store),
    });

    // Auth config (None if auth is disabled)
    let auth_config: Option<Arc<AuthConfig>> = if config.auth_enabled() {
        Some(Arc::new(AuthConfig {
            access_key_id: config.access_key_id.clone().unwrap_or_default(),
            secret_access_key: config.secret_access_key.clone().unwrap_or_default(),
        }))
    } else {
        None
    };

    // S3 API paths:
    //   GET  /                      - list buckets
    //   PUT  /{bucket}              - create bucket
    //   DELETE /{bucket}            - delete bucket
    //   HEAD /{bucket}              - head bucket
    //   GET  /{bucket}?list-type=2  - list objects (v1 without it)
    //   POST /{bucket}?delete       - delete multiple objects
    //   PUT  /{bucket}/{key...}     - put object / copy / upload part
    //   GET  /{bucket}/{key...}     - get object (honors Range)
    //   HEAD /{bucket}/{key...}     - head object
    //   DELETE /{bucket}/{key...}   - delete object / abort multipart
    //   POST /{bucket}/{key...}     - initiate / complete multipart
    let app = Router::new()
        .route("/health", get(health_check))
        // Root: list buckets + HEAD probe for S3 client compatibility;
        // other service-level verbs have no meaning here.
        .route(
            "/",
            get(list_buckets)
                .head(head_root)
                .fallback(service_not_implemented),
        )
        // Object operations (wildcard routes first - more specific)
        .route(
            "/:bucket/*key",
            get(get_object)
                .put(put_object_or_copy)
                .delete(delete_object)
                .head(head_object)
                .post(post_object)
                .fallback(method_not_allowed),
        )
        // Bucket operations (with and without trailing slash)
        .route(
            "/:bucket",
            get(bucket_get_handler)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(head_bucket)
                .post(delete_objects)
                .fallback(method_not_allowed),
        )
        .route(
            "/:bucket/",
            get(bucket_get_handler)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(head_bucket)
                .post(delete_objects)
                .fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        // SigV4 authentication (no-op when auth_config is None)
        .layer(middleware::from_fn(sigv4_auth_middleware))
        .layer(axum::Extension(auth_config))
        // Request IDs outermost of the app-level middleware so auth
        // rejections are stamped too.
        .layer(middleware::from_fn(geckos3::api::request_id_middleware))
        // Global in-flight cap; excess requests queue on the semaphore.
        .layer(GlobalConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        // Upload size limits are out of scope; stream bodies of any size.
        .layer(DefaultBodyLimit::disable())
        // CORS must be outermost to handle OPTIONS preflight before auth
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("geckos3 listening on http://{}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gc_task.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    // In-flight requests get a bounded drain window, then the process
    // exits regardless.
    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        warn!("Shutdown grace period elapsed, forcing exit");
        std::process::exit(0);
    });
}
