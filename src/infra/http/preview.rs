//! Preview session endpoints: `/api/preview` and `/api/disable-preview`.
//!
//! The session is a signed cookie, so a browser can only hold one after the
//! activation endpoint accepted a valid secret.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use tracing::info;

use crate::application::{error::HttpError, preview::PreviewRequest};

use super::{no_store, public::HttpState};

/// Name of the signed preview-session cookie.
pub const PREVIEW_COOKIE: &str = "__vetrina_preview";
const SESSION_VALUE: &str = "drafts";

/// Signing key and attributes of the preview cookie.
#[derive(Clone)]
pub struct PreviewCookies {
    key: Key,
    secure: bool,
}

impl PreviewCookies {
    /// `secure` marks cookies `Secure; SameSite=None` so they survive inside
    /// the cross-origin studio iframe.
    pub fn new(key: Key, secure: bool) -> Self {
        Self { key, secure }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn session_cookie(&self) -> Cookie<'static> {
        let same_site = if self.secure {
            SameSite::None
        } else {
            SameSite::Lax
        };
        Cookie::build((PREVIEW_COOKIE, SESSION_VALUE))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(same_site)
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(PREVIEW_COOKIE).path("/").build()
    }
}

/// Whether the request carries a valid, correctly signed preview session.
pub fn session_active(jar: &SignedCookieJar) -> bool {
    jar.get(PREVIEW_COOKIE).is_some()
}

pub(super) async fn enable_preview(
    State(state): State<HttpState>,
    jar: SignedCookieJar,
    Query(request): Query<PreviewRequest>,
) -> Response {
    match state.preview.enable(&request).await {
        Ok(activation) => {
            let jar = jar.add(state.cookies.session_cookie());
            no_store((jar, Redirect::temporary(&activation.redirect_to)).into_response())
        }
        Err(err) => no_store(HttpError::from(err).into_response()),
    }
}

pub(super) async fn disable_preview(
    State(state): State<HttpState>,
    jar: SignedCookieJar,
) -> Response {
    let was_active = session_active(&jar);
    let jar = jar.remove(state.cookies.removal_cookie());
    info!(
        target = "vetrina::preview",
        was_active, "preview session disabled"
    );
    no_store((jar, Redirect::temporary(state.preview.disable())).into_response())
}
