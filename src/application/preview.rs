//! Preview session activation.
//!
//! A session may only be opened by presenting the currently valid secret. The
//! HTTP layer owns the cookie; this service decides whether to issue it.

use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::domain::{
    links::resolve_href,
    preview_secret::{PreviewSecret, SecretId},
};

use super::{
    content::ContentClientSelector,
    preview_secret::{SecretStore, SecretStoreError},
};

const METRIC_PREVIEW_ENABLE: &str = "vetrina_preview_enable_total";

/// Where a disabled session is sent.
pub const EXIT_REDIRECT: &str = "/";

/// Query string of the activation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(rename = "documentType", default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview secret missing from request")]
    MissingSecret,
    #[error("preview secret is not the active secret")]
    InvalidSecret,
    #[error("no content token configured for preview")]
    MissingReadToken,
    #[error("failed to read preview secret")]
    Store(#[from] SecretStoreError),
}

impl PreviewError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::MissingSecret => "missing_secret",
            Self::InvalidSecret => "invalid_secret",
            Self::MissingReadToken => "misconfigured",
            Self::Store(_) => "backend_error",
        }
    }
}

/// A successful activation: the caller sets the session and redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewActivation {
    pub redirect_to: String,
}

#[derive(Clone)]
pub struct PreviewService {
    selector: ContentClientSelector,
    store: SecretStore,
    secret_id: SecretId,
}

impl PreviewService {
    pub fn new(selector: ContentClientSelector, store: SecretStore, secret_id: SecretId) -> Self {
        Self {
            selector,
            store,
            secret_id,
        }
    }

    pub async fn enable(
        &self,
        request: &PreviewRequest,
    ) -> Result<PreviewActivation, PreviewError> {
        self.enable_at(request, OffsetDateTime::now_utc()).await
    }

    pub async fn enable_at(
        &self,
        request: &PreviewRequest,
        now: OffsetDateTime,
    ) -> Result<PreviewActivation, PreviewError> {
        let result = self.validate(request, now).await;
        let outcome = match &result {
            Ok(_) => "enabled",
            Err(err) => err.outcome(),
        };
        counter!(METRIC_PREVIEW_ENABLE, "outcome" => outcome).increment(1);

        match &result {
            Ok(activation) => info!(
                target = "vetrina::preview",
                redirect_to = %activation.redirect_to,
                "preview session enabled"
            ),
            Err(err) => warn!(
                target = "vetrina::preview",
                outcome,
                error = %err,
                "preview activation refused"
            ),
        }

        result
    }

    async fn validate(
        &self,
        request: &PreviewRequest,
        now: OffsetDateTime,
    ) -> Result<PreviewActivation, PreviewError> {
        let presented = request
            .secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or(PreviewError::MissingSecret)?;

        let token = self
            .selector
            .read_token()
            .ok_or(PreviewError::MissingReadToken)?;
        let client = self.selector.authenticated(token);

        let current = self.store.current(&client, &self.secret_id, now).await?;
        let valid = current.is_some_and(|secret| secret.matches(presented));
        if !valid {
            return Err(PreviewError::InvalidSecret);
        }

        let redirect_to =
            resolve_href(request.document_type.as_deref(), request.slug.as_deref())
                .unwrap_or_else(|| EXIT_REDIRECT.to_string());
        Ok(PreviewActivation { redirect_to })
    }

    /// Target of the disable endpoint; session state is dropped by the caller.
    pub fn disable(&self) -> &'static str {
        EXIT_REDIRECT
    }

    /// Force a fresh secret regardless of the current one's age.
    pub async fn rotate_secret(&self) -> Result<PreviewSecret, PreviewError> {
        let token = self
            .selector
            .write_token()
            .ok_or(PreviewError::MissingReadToken)?;
        let client = self.selector.authenticated(token);
        let secret = self
            .store
            .rotate_at(&client, &self.secret_id, OffsetDateTime::now_utc())
            .await?;
        Ok(secret)
    }
}
