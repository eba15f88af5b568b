//! Repository traits describing content backend adapters.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::queries::ContentQuery;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("content backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("content backend rejected credentials: {message}")]
    Unauthorized { message: String },
    #[error("content backend timeout")]
    Timeout,
    #[error("invalid response from content backend: {message}")]
    InvalidResponse { message: String },
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RepoError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn from_persistence(err: impl fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which document set a query sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Perspective {
    /// Published documents only.
    Published,
    /// Drafts overlaid on their published counterparts.
    PreviewDrafts,
    /// Every document as stored, drafts and published side by side.
    Raw,
}

impl Perspective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::PreviewDrafts => "previewDrafts",
            Self::Raw => "raw",
        }
    }
}

/// Read or write token for the content backend.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Per-client request settings handed to the backend on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub use_cdn: bool,
    pub token: Option<BearerToken>,
    pub perspective: Perspective,
}

impl ClientConfig {
    pub fn public() -> Self {
        Self {
            use_cdn: true,
            token: None,
            perspective: Perspective::Published,
        }
    }

    pub fn drafts(token: BearerToken) -> Self {
        Self {
            use_cdn: false,
            token: Some(token),
            perspective: Perspective::PreviewDrafts,
        }
    }

    pub fn authenticated(token: BearerToken) -> Self {
        Self {
            use_cdn: false,
            token: Some(token),
            perspective: Perspective::Raw,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Run a query and return its raw `result` value.
    ///
    /// Single-document queries yield `Value::Null` when nothing matches; list
    /// queries yield an array.
    async fn query(&self, config: &ClientConfig, query: &ContentQuery)
    -> Result<Value, RepoError>;

    /// Create the document, or replace it wholesale when its `_id` exists.
    async fn create_or_replace(
        &self,
        config: &ClientConfig,
        document: Value,
    ) -> Result<(), RepoError>;
}
