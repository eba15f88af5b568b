//! Per-request content clients.
//!
//! Draft visibility is decided by the caller and passed in explicitly; there
//! is no process-wide draft switch.

use std::{sync::Arc, time::Instant};

use metrics::histogram;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::queries::ContentQuery;

use super::repos::{BearerToken, ClientConfig, ContentBackend, Perspective, RepoError};

const METRIC_CONTENT_FETCH_MS: &str = "vetrina_content_fetch_ms";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to decode `{query}` result: {source}")]
    Decode {
        query: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Credentials that switch a request onto the draft read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOptions {
    token: BearerToken,
}

impl PreviewOptions {
    pub fn new(token: BearerToken) -> Self {
        Self { token }
    }

    /// Options for a request whose preview session is `active`.
    ///
    /// Without a configured read token the request falls back to public reads.
    pub fn from_session(active: bool, read_token: Option<&BearerToken>) -> Option<Self> {
        if !active {
            return None;
        }
        match read_token {
            Some(token) => Some(Self::new(token.clone())),
            None => {
                warn!(
                    target = "vetrina::content",
                    "preview session present but no read token configured; serving published content"
                );
                None
            }
        }
    }

    pub fn token(&self) -> &BearerToken {
        &self.token
    }
}

/// A backend handle bound to one read mode.
#[derive(Clone)]
pub struct ContentClient {
    backend: Arc<dyn ContentBackend>,
    config: ClientConfig,
}

impl ContentClient {
    pub fn new(backend: Arc<dyn ContentBackend>, config: ClientConfig) -> Self {
        Self { backend, config }
    }

    pub fn is_draft_mode(&self) -> bool {
        self.config.perspective == Perspective::PreviewDrafts
    }

    pub async fn raw(&self, query: &ContentQuery) -> Result<Value, ContentError> {
        let started = Instant::now();
        let result = self.backend.query(&self.config, query).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        histogram!(
            METRIC_CONTENT_FETCH_MS,
            "query" => query.name(),
            "perspective" => self.config.perspective.as_str()
        )
        .record(elapsed_ms);
        debug!(
            target = "vetrina::content",
            query = query.name(),
            perspective = self.config.perspective.as_str(),
            cdn = self.config.use_cdn,
            elapsed_ms,
            ok = result.is_ok(),
            "content query finished"
        );

        Ok(result?)
    }

    /// Fetch a single document; `None` when the backend returns null.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        query: &ContentQuery,
    ) -> Result<Option<T>, ContentError> {
        match self.raw(query).await? {
            Value::Null => Ok(None),
            value => decode(query, value).map(Some),
        }
    }

    /// Fetch a document list; a null result is an empty list.
    pub async fn fetch_list<T: DeserializeOwned>(
        &self,
        query: &ContentQuery,
    ) -> Result<Vec<T>, ContentError> {
        match self.raw(query).await? {
            Value::Null => Ok(Vec::new()),
            value => decode(query, value),
        }
    }

    pub async fn create_or_replace(&self, document: Value) -> Result<(), ContentError> {
        self.backend
            .create_or_replace(&self.config, document)
            .await
            .map_err(ContentError::from)
    }
}

fn decode<T: DeserializeOwned>(query: &ContentQuery, value: Value) -> Result<T, ContentError> {
    serde_json::from_value(value).map_err(|source| ContentError::Decode {
        query: query.name(),
        source,
    })
}

/// Builds the right client for each request from immutable configuration.
#[derive(Clone)]
pub struct ContentClientSelector {
    backend: Arc<dyn ContentBackend>,
    read_token: Option<BearerToken>,
    write_token: Option<BearerToken>,
}

impl ContentClientSelector {
    pub fn new(
        backend: Arc<dyn ContentBackend>,
        read_token: Option<BearerToken>,
        write_token: Option<BearerToken>,
    ) -> Self {
        Self {
            backend,
            read_token,
            write_token,
        }
    }

    /// Public client without options, draft client with them.
    pub fn client(&self, preview: Option<&PreviewOptions>) -> ContentClient {
        let config = match preview {
            Some(options) => ClientConfig::drafts(options.token().clone()),
            None => ClientConfig::public(),
        };
        ContentClient::new(self.backend.clone(), config)
    }

    /// Token-bearing client over the raw perspective, for private documents.
    pub fn authenticated(&self, token: &BearerToken) -> ContentClient {
        ContentClient::new(
            self.backend.clone(),
            ClientConfig::authenticated(token.clone()),
        )
    }

    pub fn read_token(&self) -> Option<&BearerToken> {
        self.read_token.as_ref()
    }

    /// Token used for writes; falls back to the read token.
    pub fn write_token(&self) -> Option<&BearerToken> {
        self.write_token.as_ref().or(self.read_token.as_ref())
    }
}
