//! Editor-facing preview pane, served on the studio listener.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use datastar::prelude::ElementPatchMode;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    application::{
        error::HttpError,
        preview_pane::{PANE_NOTICE, PaneError, PreviewPaneService, document_query},
        stream::StreamBuilder,
    },
    domain::documents::DocumentRef,
    presentation::{
        studio::{
            FRAME_SELECTOR, PaneErrorTemplate, PaneFrameTemplate, PreviewPaneTemplate, frame_url,
        },
        views::{render_template, render_template_response},
    },
};

use super::{
    DATASTAR_REQUEST_HEADER, health,
    middleware::{log_responses, set_request_context},
    no_store,
};

const SOURCE: &str = "infra::http::studio";
const FRAME_FAILED: &str = "The preview could not be loaded.";

#[derive(Clone)]
pub struct StudioState {
    pub pane: Arc<PreviewPaneService>,
}

pub fn build_studio_router(state: StudioState) -> Router {
    Router::new()
        .route("/preview-pane", get(preview_pane))
        .route("/preview-pane/frame", get(preview_frame))
        .route("/preview-pane/rotate-secret", post(rotate_secret))
        .route("/production-url", get(production_url))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn preview_pane(
    State(state): State<StudioState>,
    Query(document): Query<DocumentRef>,
) -> Response {
    let template = PreviewPaneTemplate::from(state.pane.pane(&document));
    no_store(render_template_response(template, StatusCode::OK))
}

async fn preview_frame(
    State(state): State<StudioState>,
    headers: HeaderMap,
    Query(document): Query<DocumentRef>,
) -> Response {
    let html = match state.pane.frame(&document).await {
        Ok(src) => render_template(PaneFrameTemplate {
            src,
            href: document.href().unwrap_or_default(),
        }),
        Err(err) => {
            let message = match err {
                PaneError::NotPreviewable => PANE_NOTICE,
                other => {
                    warn!(
                        target = "vetrina::preview::pane",
                        error = %other,
                        "preview frame unavailable"
                    );
                    FRAME_FAILED
                }
            };
            render_template(PaneErrorTemplate {
                message: message.to_string(),
                frame_url: frame_url(&document_query(&document)),
            })
        }
    };

    let html = match html {
        Ok(html) => html,
        Err(err) => return no_store(err.into_response()),
    };

    if headers.contains_key(DATASTAR_REQUEST_HEADER) {
        let mut stream = StreamBuilder::new();
        stream.push_patch(html.0, FRAME_SELECTOR, ElementPatchMode::Outer);
        no_store(stream.into_response())
    } else {
        no_store(html.into_response())
    }
}

async fn rotate_secret(State(state): State<StudioState>) -> Response {
    match state.pane.rotate().await {
        Ok(epoch) => {
            info!(
                target = "vetrina::preview::pane",
                epoch, "preview secret rotated from the studio"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => pane_failure(err).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct ProductionUrl {
    url: Option<String>,
}

async fn production_url(
    State(state): State<StudioState>,
    Query(document): Query<DocumentRef>,
) -> Response {
    match state.pane.production_url(&document).await {
        Ok(url) => no_store(Json(ProductionUrl { url }).into_response()),
        Err(err) => no_store(pane_failure(err).into_response()),
    }
}

fn pane_failure(err: PaneError) -> HttpError {
    let (status, public_message) = match &err {
        PaneError::NotPreviewable => (StatusCode::UNPROCESSABLE_ENTITY, "Document has no preview"),
        PaneError::MissingToken => (StatusCode::INTERNAL_SERVER_ERROR, "Service misconfigured"),
        PaneError::Timeout(_) | PaneError::Secret(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
        ),
    };
    HttpError::from_error(SOURCE, status, public_message, &err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn pane_failures_map_to_statuses() {
        let cases = [
            (PaneError::MissingToken, StatusCode::INTERNAL_SERVER_ERROR),
            (
                PaneError::Timeout(Duration::from_secs(1)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PaneError::Secret("boom".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (PaneError::NotPreviewable, StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, status) in cases {
            assert_eq!(pane_failure(err).status(), status);
        }
    }
}
