//! In-process content store.
//!
//! Evaluates the typed queries against documents held in memory and applies
//! the same visibility rules as the hosted backend: ids containing a `.` are
//! private and drafts are only visible through token-bearing clients.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};

use crate::application::repos::{ClientConfig, ContentBackend, Perspective, RepoError};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::{
    documents::{is_draft_id, published_id},
    queries::{Cardinality, ContentQuery},
};
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::content::memory";

#[derive(Debug, Default)]
pub struct MemoryContentBackend {
    documents: RwLock<BTreeMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryContentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = Value>) -> Result<Self, RepoError> {
        let backend = Self::new();
        for document in documents {
            backend.insert(document)?;
        }
        Ok(backend)
    }

    /// Parse a newline-delimited JSON export, one document per line.
    pub fn from_ndjson(text: &str) -> Result<Self, RepoError> {
        let documents = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Value>(line).map_err(|err| {
                    RepoError::invalid_response(format!("seed line {}: {err}", index + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_documents(documents)
    }

    pub async fn from_ndjson_file(path: &Path) -> Result<Self, InfraError> {
        let text = tokio::fs::read_to_string(path).await?;
        let backend = Self::from_ndjson(&text).map_err(|err| {
            InfraError::configuration(format!("invalid seed file {}: {err}", path.display()))
        })?;
        info!(
            target = "vetrina::content::memory",
            path = %path.display(),
            documents = backend.len(),
            "loaded content seed"
        );
        Ok(backend)
    }

    /// Store a document as-is, without counting it as a client write.
    pub fn insert(&self, document: Value) -> Result<(), RepoError> {
        let id = document_id(&document)?;
        rw_write(&self.documents, SOURCE, "insert").insert(id, document);
        Ok(())
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        rw_read(&self.documents, SOURCE, "document").get(id).cloned()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.documents, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mutations accepted through the backend interface.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn visible(&self, config: &ClientConfig) -> Vec<Value> {
        let documents = rw_read(&self.documents, SOURCE, "visible");
        let readable = documents
            .iter()
            .filter(|(id, _)| config.is_authenticated() || !id.contains('.'));

        match config.perspective {
            Perspective::Raw => readable.map(|(_, document)| document.clone()).collect(),
            Perspective::Published => readable
                .filter(|(id, _)| !is_draft_id(id))
                .map(|(_, document)| document.clone())
                .collect(),
            Perspective::PreviewDrafts => {
                let mut overlay: BTreeMap<&str, Value> = BTreeMap::new();
                for (id, document) in readable {
                    let key = published_id(id);
                    if is_draft_id(id) {
                        overlay.insert(key, as_published(document, id, key));
                    } else {
                        overlay.entry(key).or_insert_with(|| document.clone());
                    }
                }
                overlay.into_values().collect()
            }
        }
    }
}

#[async_trait]
impl ContentBackend for MemoryContentBackend {
    async fn query(
        &self,
        config: &ClientConfig,
        query: &ContentQuery,
    ) -> Result<Value, RepoError> {
        let mut matched: Vec<Value> = self
            .visible(config)
            .into_iter()
            .filter(|document| query.matches(document))
            .collect();
        query.sort(&mut matched);

        debug!(
            target = "vetrina::content::memory",
            query = query.name(),
            perspective = config.perspective.as_str(),
            matched = matched.len(),
            "evaluated query"
        );

        Ok(match query.cardinality() {
            Cardinality::One => matched.into_iter().next().unwrap_or(Value::Null),
            Cardinality::Many => Value::Array(matched),
        })
    }

    async fn create_or_replace(
        &self,
        config: &ClientConfig,
        mut document: Value,
    ) -> Result<(), RepoError> {
        if !config.is_authenticated() {
            return Err(RepoError::unauthorized("mutations require a token"));
        }
        let id = document_id(&document)?;
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(RepoError::from_persistence)?;

        let mut documents = rw_write(&self.documents, SOURCE, "create_or_replace");
        let created_at = documents
            .get(&id)
            .and_then(|existing| existing.get("_createdAt").cloned())
            .unwrap_or_else(|| Value::String(now.clone()));
        if let Some(fields) = document.as_object_mut() {
            fields.insert("_createdAt".to_string(), created_at);
            fields.insert("_updatedAt".to_string(), Value::String(now));
        }
        documents.insert(id, document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn document_id(document: &Value) -> Result<String, RepoError> {
    document
        .get("_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RepoError::invalid_response("document is missing `_id`"))
}

/// A draft seen through the overlay: published id, draft id kept aside.
fn as_published(document: &Value, draft_id: &str, published: &str) -> Value {
    let mut document = document.clone();
    if let Some(fields) = document.as_object_mut() {
        fields.insert("_id".to_string(), Value::String(published.to_string()));
        fields.insert(
            "_originalId".to_string(),
            Value::String(draft_id.to_string()),
        );
    }
    document
}
