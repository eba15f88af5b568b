mod middleware;
mod preview;
mod public;
mod studio;

pub use middleware::redact_query;
pub use preview::{PREVIEW_COOKIE, PreviewCookies, session_active};
pub use public::{HttpState, build_public_router};
pub use studio::{StudioState, build_studio_router};

use axum::http::{HeaderValue, StatusCode, header::CACHE_CONTROL};
use axum::response::{IntoResponse, Response};

const DATASTAR_REQUEST_HEADER: &str = "datastar-request";

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Forbid any cache between us and the browser from keeping the response.
fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
