use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::StorageBackend;
use common::retry::RetryPolicy;
use common::storage::RemoteStorage;
use common::storage::local::LocalStorage;
use common::storage::pcloud::PCloudProvider;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reelhouse::catalog::{CatalogStore, PgCatalog};
use reelhouse::config::AppConfig;
use reelhouse::feed::{CacheBackend, FeedCache, MemoryCache, RedisCache};
use reelhouse::refresh::{LinkRefresher, run_link_refresher};
use reelhouse::services::VideoService;
use reelhouse::state::AppState;
use reelhouse::storage::StorageRotator;
use reelhouse::{build_router, cors_layer, database, seed};

/// Lifetime of links handed out by the local storage backend.
const LOCAL_LINK_TTL_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("loading configuration")?;

    let db = database::init_db(&config.database.url)
        .await
        .context("connecting to database")?;
    seed::ensure_indexes(&db)
        .await
        .context("creating indexes")?;
    let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalog::new(db));

    let cache: Arc<dyn CacheBackend> = if config.cache.enabled {
        match RedisCache::connect(&config.cache.url).await {
            Ok(redis) => {
                info!(url = %config.cache.url, "Feed cache backed by Redis");
                Arc::new(redis)
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, falling back to in-process feed cache");
                Arc::new(MemoryCache::new())
            }
        }
    } else {
        info!("Redis disabled, using in-process feed cache");
        Arc::new(MemoryCache::new())
    };

    let feed = Arc::new(FeedCache::new(
        cache,
        catalog.clone(),
        Duration::from_secs(config.cache.feed_ttl_secs),
        RetryPolicy::new(
            config.cache.invalidate_retries,
            Duration::from_millis(config.cache.retry_base_delay_ms),
            Duration::from_millis(config.cache.retry_max_delay_ms),
        ),
    ));

    let storage = &config.storage;
    let provider: Arc<dyn RemoteStorage> = match storage.backend {
        StorageBackend::Pcloud => Arc::new(
            PCloudProvider::new(
                storage.provider_base_url.clone(),
                Duration::from_secs(storage.upload_timeout_secs),
            )
            .context("building storage provider client")?,
        ),
        StorageBackend::Local => Arc::new(
            LocalStorage::new(
                PathBuf::from(&storage.local_path),
                storage.local_public_url.clone(),
                chrono::Duration::hours(LOCAL_LINK_TTL_HOURS),
            )
            .await
            .context("preparing local storage directory")?,
        ),
    };

    let rotator = Arc::new(StorageRotator::new(
        catalog.clone(),
        provider,
        Duration::from_secs(storage.upload_timeout_secs),
        Duration::from_secs(storage.link_timeout_secs),
    ));
    let refresher = Arc::new(LinkRefresher::new(
        catalog.clone(),
        rotator.clone(),
        chrono::Duration::seconds(config.link_refresh.refresh_window_secs as i64),
    ));
    let service = Arc::new(VideoService::new(catalog, feed, rotator, refresher.clone()));

    let shutdown = CancellationToken::new();
    let refresher_task = if config.link_refresh.enabled {
        Some(tokio::spawn(run_link_refresher(
            refresher,
            Duration::from_secs(config.link_refresh.interval_secs),
            shutdown.clone(),
        )))
    } else {
        info!("Link refresher disabled");
        None
    };

    let state = AppState {
        service,
        jwt_secret: Arc::from(config.auth.jwt_secret.as_str()),
        max_upload_bytes: usize::try_from(storage.max_upload_bytes).unwrap_or(usize::MAX),
    };

    let mut app = build_router(state);
    if storage.backend == StorageBackend::Local {
        app = app.nest_service("/media", ServeDir::new(&storage.local_path));
    }
    let app = app.layer(cors_layer(&config.server.cors));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server running at http://{}", addr);
    info!("API docs at http://{}/scalar", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            signal.cancel();
        })
        .await
        .context("running API server")?;

    shutdown.cancel();
    if let Some(task) = refresher_task {
        let _ = task.await;
    }

    Ok(())
}
