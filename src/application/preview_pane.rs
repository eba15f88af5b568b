//! Editor-side preview pane.
//!
//! The pane resolves the edited document to a site path, obtains the current
//! secret through a short-lived cache and hands the browser an activation URL
//! to load inside an iframe.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use metrics::counter;
use moka::{Expiry, future::Cache};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

use crate::domain::{documents::DocumentRef, preview_secret::SecretId};

use super::{content::ContentClientSelector, preview_secret::SecretStore};

const METRIC_SECRET_CACHE_FETCH: &str = "vetrina_secret_cache_fetch_total";
const GET_SECRET_OPERATION: &str = "getSecret";
const SECRET_CACHE_CAPACITY: u64 = 64;

/// Path of the activation endpoint on the public site.
pub const PREVIEW_PATH: &str = "/api/preview";

/// Shown instead of the iframe while the document has no resolvable path.
pub const PANE_NOTICE: &str = "Please add a slug to the post to see the preview!";

#[derive(Debug, Clone, Error)]
pub enum PaneError {
    #[error("document has no previewable path")]
    NotPreviewable,
    #[error("no content token configured for the preview pane")]
    MissingToken,
    #[error("timed out after {0:?} waiting for the preview secret")]
    Timeout(Duration),
    #[error("failed to obtain preview secret: {0}")]
    Secret(String),
}

/// Identity of a cached asynchronous read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuspendKey {
    pub operation: &'static str,
    pub resource: String,
    pub epoch: u64,
}

/// A secret value together with how long it will still be accepted.
#[derive(Clone)]
pub struct FetchedSecret {
    pub value: String,
    pub valid_for: Duration,
}

impl FetchedSecret {
    pub fn new(value: impl Into<String>, valid_for: Duration) -> Self {
        Self {
            value: value.into(),
            valid_for,
        }
    }
}

impl std::fmt::Debug for FetchedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedSecret")
            .field("value", &"<redacted>")
            .field("valid_for", &self.valid_for)
            .finish()
    }
}

/// Entries live for the cache TTL or until the secret expires, whichever is sooner.
struct SecretExpiry {
    ttl: Duration,
}

impl Expiry<SuspendKey, FetchedSecret> for SecretExpiry {
    fn expire_after_create(
        &self,
        _key: &SuspendKey,
        value: &FetchedSecret,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.ttl.min(value.valid_for))
    }
}

/// TTL cache in front of secret reads.
///
/// Concurrent callers for the same key share one in-flight fetch. Failures are
/// returned to every waiter but never stored.
pub struct SecretCache {
    cache: Cache<SuspendKey, FetchedSecret>,
    epoch: AtomicU64,
    timeout: Duration,
}

impl SecretCache {
    pub fn new(ttl: Duration, timeout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(SECRET_CACHE_CAPACITY)
            .expire_after(SecretExpiry { ttl })
            .build();
        Self {
            cache,
            epoch: AtomicU64::new(0),
            timeout,
        }
    }

    pub fn key(&self, id: &SecretId) -> SuspendKey {
        SuspendKey {
            operation: GET_SECRET_OPERATION,
            resource: id.as_str().to_string(),
            epoch: self.epoch.load(Ordering::Acquire),
        }
    }

    /// Move to a new epoch so later lookups miss; returns the new epoch.
    pub fn bump_epoch(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.cache.invalidate_all();
        epoch
    }

    pub async fn get_or_fetch<F>(&self, id: &SecretId, fetch: F) -> Result<String, PaneError>
    where
        F: Future<Output = Result<FetchedSecret, PaneError>>,
    {
        let key = self.key(id);
        let timeout = self.timeout;
        let resource = key.resource.clone();

        self.cache
            .try_get_with(key, async move {
                let result = match tokio::time::timeout(timeout, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(PaneError::Timeout(timeout)),
                };
                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(PaneError::Timeout(_)) => "timeout",
                    Err(_) => "error",
                };
                counter!(METRIC_SECRET_CACHE_FETCH, "outcome" => outcome).increment(1);
                debug!(
                    target = "vetrina::preview::pane",
                    resource = %resource,
                    outcome,
                    "secret cache filled"
                );
                result
            })
            .await
            .map(|secret| secret.value)
            .map_err(Arc::unwrap_or_clone)
    }
}

/// What the pane shell should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneView {
    /// Blocking notice, no iframe.
    Notice { message: &'static str },
    /// Card chrome whose frame region loads from `frame_query`.
    Frame { href: String, frame_query: String },
}

pub struct PreviewPaneService {
    selector: ContentClientSelector,
    store: SecretStore,
    secret_id: SecretId,
    site_url: Url,
    cache: Arc<SecretCache>,
}

impl PreviewPaneService {
    pub fn new(
        selector: ContentClientSelector,
        store: SecretStore,
        secret_id: SecretId,
        site_url: Url,
        cache: Arc<SecretCache>,
    ) -> Self {
        Self {
            selector,
            store,
            secret_id,
            site_url,
            cache,
        }
    }

    /// Decide between the notice and the frame shell without touching the backend.
    pub fn pane(&self, document: &DocumentRef) -> PaneView {
        match document.href() {
            None => PaneView::Notice {
                message: PANE_NOTICE,
            },
            Some(href) => PaneView::Frame {
                href,
                frame_query: document_query(document),
            },
        }
    }

    /// Activation URL for the iframe, carrying the current secret.
    pub async fn frame(&self, document: &DocumentRef) -> Result<String, PaneError> {
        if document.href().is_none() {
            return Err(PaneError::NotPreviewable);
        }
        let secret = self.secret().await?;
        Ok(preview_url(
            &self.site_url,
            document.document_type.as_deref(),
            document.slug.as_deref(),
            Some(&secret),
        ))
    }

    /// Same URL for the "open preview" document action; `None` when not previewable.
    pub async fn production_url(
        &self,
        document: &DocumentRef,
    ) -> Result<Option<String>, PaneError> {
        match self.frame(document).await {
            Ok(url) => Ok(Some(url)),
            Err(PaneError::NotPreviewable) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn bump_epoch(&self) -> u64 {
        self.cache.bump_epoch()
    }

    /// Operator-forced rotation; the pane stops serving the old secret at once.
    pub async fn rotate(&self) -> Result<u64, PaneError> {
        let token = self
            .selector
            .write_token()
            .ok_or(PaneError::MissingToken)?;
        let client = self.selector.authenticated(token);
        self.store
            .rotate_at(&client, &self.secret_id, time::OffsetDateTime::now_utc())
            .await
            .map_err(|err| PaneError::Secret(err.to_string()))?;
        Ok(self.bump_epoch())
    }

    async fn secret(&self) -> Result<String, PaneError> {
        let token = self
            .selector
            .write_token()
            .ok_or(PaneError::MissingToken)?;
        let client = self.selector.authenticated(token);
        let store = self.store;
        let id = self.secret_id.clone();

        self.cache
            .get_or_fetch(&self.secret_id, async move {
                let now = OffsetDateTime::now_utc();
                match store.secret_at(&client, &id, true, now).await {
                    Ok(Some(secret)) => {
                        let valid_for = store.remaining(&secret, now);
                        Ok(FetchedSecret::new(secret.value, valid_for))
                    }
                    Ok(None) => Err(PaneError::Secret("no secret returned".to_string())),
                    Err(err) => {
                        warn!(
                            target = "vetrina::preview::pane",
                            error = %err,
                            "failed to fetch preview secret"
                        );
                        Err(PaneError::Secret(err.to_string()))
                    }
                }
            })
            .await
    }
}

/// Build `{site_url}/api/preview` with only the parameters that are present.
pub fn preview_url(
    site_url: &Url,
    document_type: Option<&str>,
    slug: Option<&str>,
    secret: Option<&str>,
) -> String {
    let mut url = site_url.clone();
    let base = site_url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}{PREVIEW_PATH}"));
    url.set_query(None);
    url.set_fragment(None);

    let params: Vec<(&str, &str)> = [
        ("documentType", document_type),
        ("slug", slug),
        ("secret", secret),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|value| (name, value)))
    .collect();

    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    url.into()
}

/// Re-encoded `documentType`/`slug` query for the frame endpoint.
pub fn document_query(document: &DocumentRef) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if let Some(document_type) = document.document_type.as_deref() {
        serializer.append_pair("documentType", document_type);
    }
    if let Some(slug) = document.slug.as_deref() {
        serializer.append_pair("slug", slug);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn site() -> Url {
        Url::parse("https://site.example").expect("url")
    }

    #[test]
    fn preview_url_carries_all_present_params() {
        let url = preview_url(&site(), Some("post"), Some("hello-world"), Some("abc123"));
        assert_eq!(
            url,
            "https://site.example/api/preview?documentType=post&slug=hello-world&secret=abc123"
        );
    }

    #[test]
    fn preview_url_omits_absent_params() {
        assert_eq!(
            preview_url(&site(), None, None, None),
            "https://site.example/api/preview"
        );
        assert_eq!(
            preview_url(&site(), Some("page"), None, Some("s")),
            "https://site.example/api/preview?documentType=page&secret=s"
        );
    }

    #[test]
    fn preview_url_keeps_site_base_path() {
        let base = Url::parse("https://site.example/en/").expect("url");
        assert_eq!(
            preview_url(&base, None, Some("a b"), None),
            "https://site.example/en/api/preview?slug=a+b"
        );
    }

    #[tokio::test]
    async fn cache_serves_repeat_reads_without_refetching() {
        let cache = SecretCache::new(Duration::from_secs(60), Duration::from_secs(1));
        let id = SecretId::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch(&id, async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(FetchedSecret::new("abc123", HOUR))
                })
                .await
                .expect("secret");
            assert_eq!(value, "abc123");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bumping_the_epoch_forces_a_fresh_fetch() {
        let cache = SecretCache::new(Duration::from_secs(60), Duration::from_secs(1));
        let id = SecretId::default();
        let before = cache.key(&id);

        cache
            .get_or_fetch(&id, async { Ok(FetchedSecret::new("first", HOUR)) })
            .await
            .expect("first");
        assert_eq!(cache.bump_epoch(), 1);
        assert_ne!(cache.key(&id), before);

        let value = cache
            .get_or_fetch(&id, async { Ok(FetchedSecret::new("second", HOUR)) })
            .await
            .expect("second");
        assert_eq!(value, "second");
    }

    #[tokio::test]
    async fn slow_fetches_time_out_and_are_not_cached() {
        let cache = SecretCache::new(Duration::from_secs(60), Duration::from_millis(20));
        let id = SecretId::default();

        let err = cache
            .get_or_fetch(&id, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(FetchedSecret::new("late", HOUR))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PaneError::Timeout(_)));

        let value = cache
            .get_or_fetch(&id, async { Ok(FetchedSecret::new("retry", HOUR)) })
            .await
            .expect("retry succeeds");
        assert_eq!(value, "retry");
    }

    #[tokio::test]
    async fn fetch_errors_are_not_cached() {
        let cache = SecretCache::new(Duration::from_secs(60), Duration::from_secs(1));
        let id = SecretId::default();

        let err = cache
            .get_or_fetch(&id, async { Err(PaneError::Secret("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, PaneError::Secret(_)));

        let value = cache
            .get_or_fetch(&id, async { Ok(FetchedSecret::new("abc123", HOUR)) })
            .await
            .expect("second attempt");
        assert_eq!(value, "abc123");
    }

    #[tokio::test]
    async fn entries_never_outlive_the_secret() {
        let cache = SecretCache::new(Duration::from_secs(60), Duration::from_secs(1));
        let id = SecretId::default();

        let value = cache
            .get_or_fetch(&id, async {
                Ok(FetchedSecret::new("expiring", Duration::from_millis(50)))
            })
            .await
            .expect("first");
        assert_eq!(value, "expiring");

        tokio::time::sleep(Duration::from_millis(150)).await;

        let value = cache
            .get_or_fetch(&id, async { Ok(FetchedSecret::new("fresh", HOUR)) })
            .await
            .expect("refetched");
        assert_eq!(value, "fresh");
    }

    #[test]
    fn document_query_encodes_quotes() {
        let document = DocumentRef {
            document_type: Some("post".to_string()),
            slug: Some("a')b".to_string()),
        };
        assert_eq!(document_query(&document), "documentType=post&slug=a%27%29b");
    }
}
