use std::{future::IntoFuture, pin::pin, process, sync::Arc, time::Duration};

use axum::Router;
use axum_extra::extract::cookie::Key;
use tokio::{net::TcpListener, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vetrina::{
    application::{
        content::ContentClientSelector,
        error::AppError,
        preview::PreviewService,
        preview_pane::{PreviewPaneService, SecretCache},
        preview_secret::SecretStore,
        repos::ContentBackend,
        site::SiteService,
    },
    cache::{CacheConfig, CacheState},
    config::{self, ContentBackendKind},
    infra::{
        content::{HttpBackendConfig, HttpContentBackend, MemoryContentBackend},
        error::InfraError,
        http::{self, HttpState, PREVIEW_COOKIE, PreviewCookies, StudioState},
        telemetry,
    },
};

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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::RotateSecret(_) => run_rotate_secret(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;
    serve_http(&settings, app.http_state, app.studio_state).await
}

async fn run_rotate_secret(settings: config::Settings) -> Result<(), AppError> {
    if settings.content.backend == ContentBackendKind::Memory {
        warn!(
            target = "vetrina::rotate_secret",
            "memory backend selected; the rotated secret only lives for this process"
        );
    }
    let selector = build_selector(&settings).await?;
    let preview = PreviewService::new(
        selector,
        SecretStore::new(settings.preview.secret_ttl),
        settings.preview.secret_id.clone(),
    );

    let secret = preview.rotate_secret().await?;
    info!(
        target = "vetrina::rotate_secret",
        secret_id = %secret.id,
        created_at = %secret.created_at,
        "preview secret rotated"
    );
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    studio_state: StudioState,
}

async fn build_application_context(
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let selector = build_selector(settings).await?;
    let store = SecretStore::new(settings.preview.secret_ttl);
    let secret_id = settings.preview.secret_id.clone();

    let site = Arc::new(SiteService::new(selector.clone()));
    let preview = Arc::new(PreviewService::new(
        selector.clone(),
        store,
        secret_id.clone(),
    ));
    let secret_cache = Arc::new(SecretCache::new(
        settings.preview.secret_cache_ttl,
        settings.preview.secret_timeout,
    ));
    let pane = Arc::new(PreviewPaneService::new(
        selector,
        store,
        secret_id,
        settings.preview.site_url.clone(),
        secret_cache,
    ));

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = cache_config
        .enable_l1_cache
        .then(|| CacheState::new(cache_config, PREVIEW_COOKIE));

    let cookies = PreviewCookies::new(
        cookie_key(settings.preview.cookie_key.as_deref())?,
        settings.preview.secure_cookies(),
    );

    Ok(ApplicationContext {
        http_state: HttpState {
            site,
            preview,
            cookies,
            cache,
        },
        studio_state: StudioState { pane },
    })
}

async fn build_selector(settings: &config::Settings) -> Result<ContentClientSelector, AppError> {
    let content = &settings.content;
    let backend: Arc<dyn ContentBackend> = match content.backend {
        ContentBackendKind::Http => {
            let project_id = content.project_id.clone().ok_or_else(|| {
                AppError::from(InfraError::configuration(
                    "content.project_id is required for the http backend",
                ))
            })?;
            let backend = HttpContentBackend::new(HttpBackendConfig {
                project_id,
                dataset: content.dataset.clone(),
                api_version: content.api_version.clone(),
                request_timeout: content.request_timeout,
            })
            .map_err(|err| AppError::from(InfraError::backend(err.to_string())))?;
            Arc::new(backend)
        }
        ContentBackendKind::Memory => match content.seed_file.as_deref() {
            Some(path) if path.exists() => {
                Arc::new(MemoryContentBackend::from_ndjson_file(path).await?)
            }
            Some(path) => {
                warn!(
                    target = "vetrina::content::memory",
                    path = %path.display(),
                    "seed file not found; starting with an empty store"
                );
                Arc::new(MemoryContentBackend::new())
            }
            None => Arc::new(MemoryContentBackend::new()),
        },
    };

    if content.read_token.is_none() {
        warn!(
            target = "vetrina::content",
            "no read token configured; preview sessions cannot be enabled"
        );
    }

    Ok(ContentClientSelector::new(
        backend,
        content.read_token.clone(),
        content.write_token.clone(),
    ))
}

fn cookie_key(configured: Option<&[u8]>) -> Result<Key, AppError> {
    match configured {
        Some(bytes) => Key::try_from(bytes).map_err(|err| {
            AppError::from(InfraError::configuration(format!(
                "preview.cookie_key is unusable: {err}"
            )))
        }),
        None => {
            warn!(
                target = "vetrina::preview",
                "preview.cookie_key not set; preview sessions end when the process restarts"
            );
            Ok(Key::generate())
        }
    }
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    studio_state: StudioState,
) -> Result<(), AppError> {
    let public_router = http::build_public_router(http_state);
    let studio_router = http::build_studio_router(studio_state);

    let public_listener = TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let studio_listener = TcpListener::bind(settings.server.studio_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "vetrina::server",
        public = %settings.server.public_addr,
        studio = %settings.server.studio_addr,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    try_join!(
        serve(public_listener, public_router, grace),
        serve(studio_listener, studio_router, grace),
    )
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn serve(listener: TcpListener, router: Router, grace: Duration) -> std::io::Result<()> {
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => return result,
        () = shutdown_signal() => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                target = "vetrina::server",
                grace_seconds = grace.as_secs(),
                "connections still open after the grace period; stopping"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "vetrina::server", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "vetrina::server", "shutdown signal received, draining connections");
}
