use std::sync::Arc;

use askama::Template;
use axum::{
    Router,
    extract::{FromRef, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};

use crate::{
    application::{
        content::PreviewOptions, error::HttpError, preview::PreviewService, site::SiteService,
    },
    cache::{CacheState, response_cache_layer},
    presentation::views::{
        BlogTemplate, CategoryTemplate, HomeTemplate, LayoutChrome, LayoutContext, PageTemplate,
        PostTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    health,
    middleware::{log_responses, set_request_context},
    no_store,
    preview::{PreviewCookies, disable_preview, enable_preview, session_active},
};

const SITE_TITLE: &str = "Vetrina";

#[derive(Clone)]
pub struct HttpState {
    pub site: Arc<SiteService>,
    pub preview: Arc<PreviewService>,
    pub cookies: PreviewCookies,
    pub cache: Option<CacheState>,
}

impl FromRef<HttpState> for Key {
    fn from_ref(state: &HttpState) -> Self {
        state.cookies.key().clone()
    }
}

pub fn build_public_router(state: HttpState) -> Router {
    let cached_routes = Router::new()
        .route("/", get(home))
        .route("/blog", get(blog))
        .route("/blog/{slug}", get(post))
        .route("/blog/category/{slug}", get(category))
        .route("/{slug}", get(page))
        .fallback(not_found);

    let cached_routes = if let Some(cache_state) = state.cache.clone() {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        cached_routes
    };

    let session_routes = Router::new()
        .route("/api/preview", get(enable_preview))
        .route("/api/disable-preview", get(disable_preview))
        .route("/api/exit-preview", get(disable_preview))
        .route("/_health", get(health));

    cached_routes
        .merge(session_routes)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Per-request view of the preview session.
struct Visit {
    session: bool,
    chrome: LayoutChrome,
}

impl Visit {
    fn new(state: &HttpState, jar: &SignedCookieJar) -> (Self, Option<PreviewOptions>) {
        let session = session_active(jar);
        let options = state.site.preview_options(session);
        let chrome = LayoutChrome::new(SITE_TITLE, options.is_some());
        (Self { session, chrome }, options)
    }

    fn render<T: Template>(&self, template: T) -> Response {
        self.finish(render_template_response(template, StatusCode::OK))
    }

    fn not_found(&self) -> Response {
        self.finish(render_not_found_response(self.chrome.clone()))
    }

    fn error(&self, err: HttpError) -> Response {
        self.finish(err.into_response())
    }

    /// Draft-bearing responses must not be kept by shared caches.
    fn finish(&self, response: Response) -> Response {
        if self.session {
            no_store(response)
        } else {
            response
        }
    }
}

async fn home(State(state): State<HttpState>, jar: SignedCookieJar) -> Response {
    let (visit, options) = Visit::new(&state, &jar);
    match state.site.home(options.as_ref()).await {
        Ok(content) => visit.render(HomeTemplate {
            view: LayoutContext::new(visit.chrome.clone(), content),
        }),
        Err(err) => visit.error(err),
    }
}

async fn blog(State(state): State<HttpState>, jar: SignedCookieJar) -> Response {
    let (visit, options) = Visit::new(&state, &jar);
    match state.site.blog(options.as_ref()).await {
        Ok(content) => visit.render(BlogTemplate {
            view: LayoutContext::new(visit.chrome.clone(), content),
        }),
        Err(err) => visit.error(err),
    }
}

async fn post(
    State(state): State<HttpState>,
    jar: SignedCookieJar,
    Path(slug): Path<String>,
) -> Response {
    let (visit, options) = Visit::new(&state, &jar);
    match state.site.post(&slug, options.as_ref()).await {
        Ok(Some(content)) => visit.render(PostTemplate {
            view: LayoutContext::new(visit.chrome.clone(), content),
        }),
        Ok(None) => visit.not_found(),
        Err(err) => visit.error(err),
    }
}

async fn category(
    State(state): State<HttpState>,
    jar: SignedCookieJar,
    Path(slug): Path<String>,
) -> Response {
    let (visit, options) = Visit::new(&state, &jar);
    match state.site.category(&slug, options.as_ref()).await {
        Ok(Some(content)) => visit.render(CategoryTemplate {
            view: LayoutContext::new(visit.chrome.clone(), content),
        }),
        Ok(None) => visit.not_found(),
        Err(err) => visit.error(err),
    }
}

async fn page(
    State(state): State<HttpState>,
    jar: SignedCookieJar,
    Path(slug): Path<String>,
) -> Response {
    let (visit, options) = Visit::new(&state, &jar);
    match state.site.page(&slug, options.as_ref()).await {
        Ok(Some(content)) => visit.render(PageTemplate {
            view: LayoutContext::new(visit.chrome.clone(), content),
        }),
        Ok(None) => visit.not_found(),
        Err(err) => visit.error(err),
    }
}

async fn not_found(State(state): State<HttpState>, jar: SignedCookieJar) -> Response {
    let (visit, _) = Visit::new(&state, &jar);
    visit.not_found()
}
