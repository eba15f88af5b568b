//! End-to-end preview flow against the in-memory content store.
//!
//! Both routers are driven with `tower::ServiceExt::oneshot`; no sockets are opened.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, Response, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
};
use axum_extra::extract::cookie::Key;
use serde_json::{Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tower::ServiceExt;
use url::Url;

use vetrina::{
    application::{
        content::ContentClientSelector,
        preview::PreviewService,
        preview_pane::{PreviewPaneService, SecretCache},
        preview_secret::SecretStore,
        repos::{BearerToken, ClientConfig, ContentBackend, RepoError},
        site::SiteService,
    },
    cache::{CacheConfig, CacheState},
    domain::{preview_secret::SecretId, queries::ContentQuery},
    infra::{
        content::MemoryContentBackend,
        http::{
            HttpState, PREVIEW_COOKIE, PreviewCookies, StudioState, build_public_router,
            build_studio_router,
        },
    },
};

const SECRET: &str = "abc123";
const SEED: &str = include_str!("../content/seed.ndjson");

struct Harness {
    backend: Arc<MemoryContentBackend>,
    public: Router,
    studio: Router,
}

struct Options {
    read_token: Option<&'static str>,
    cache: bool,
    secret_validity: time::Duration,
    issued_ago: time::Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            read_token: Some("sk-read"),
            cache: false,
            secret_validity: time::Duration::minutes(60),
            issued_ago: time::Duration::minutes(10),
        }
    }
}

fn harness(options: Options) -> Harness {
    let backend = Arc::new(MemoryContentBackend::from_ndjson(SEED).expect("seed parses"));
    let issued_at = (OffsetDateTime::now_utc() - options.issued_ago)
        .format(&Rfc3339)
        .expect("timestamp");
    backend
        .insert(json!({
            "_id": "preview.secret",
            "_type": "preview.secret",
            "secret": SECRET,
            "issuedAt": issued_at,
        }))
        .expect("secret document");

    let read_token = options
        .read_token
        .map(|token| BearerToken::new(token).expect("token"));
    let selector = ContentClientSelector::new(backend.clone(), read_token, None);
    let store = SecretStore::new(options.secret_validity);

    let cache = options
        .cache
        .then(|| CacheState::new(CacheConfig::default(), PREVIEW_COOKIE));
    let public = build_public_router(HttpState {
        site: Arc::new(SiteService::new(selector.clone())),
        preview: Arc::new(PreviewService::new(
            selector.clone(),
            store,
            SecretId::default(),
        )),
        cookies: PreviewCookies::new(Key::generate(), false),
        cache,
    });

    let pane = PreviewPaneService::new(
        selector,
        store,
        SecretId::default(),
        Url::parse("http://localhost:3000").expect("site url"),
        Arc::new(SecretCache::new(
            Duration::from_secs(60),
            Duration::from_secs(5),
        )),
    );
    let studio = build_studio_router(StudioState {
        pane: Arc::new(pane),
    });

    Harness {
        backend,
        public,
        studio,
    }
}

async fn get(router: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    router
        .clone()
        .oneshot(request.body(Body::empty()).expect("request"))
        .await
        .expect("response")
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn header<'a>(response: &'a Response<Body>, name: axum::http::HeaderName) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

/// Secret embedded in the pane's "open preview" URL for the hello-world post.
async fn production_secret(studio: &Router) -> String {
    let response = get(
        studio,
        "/production-url?documentType=post&slug=hello-world",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
    let url = Url::parse(body["url"].as_str().expect("url")).expect("absolute url");
    url.query_pairs()
        .find(|(name, _)| name == "secret")
        .map(|(_, value)| value.into_owned())
        .expect("secret param")
}

/// `name=value` pair of the session cookie, ready for a `Cookie` header.
async fn open_session(router: &Router) -> String {
    let response = get(
        router,
        &format!("/api/preview?secret={SECRET}&documentType=post&slug=hello-world"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let set_cookie = header(&response, SET_COOKIE).expect("session cookie");
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

#[tokio::test]
async fn valid_secret_opens_a_session_and_redirects_to_the_document() {
    let app = harness(Options::default());
    let response = get(
        &app.public,
        "/api/preview?secret=abc123&documentType=post&slug=hello-world",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(header(&response, LOCATION), Some("/blog/hello-world"));
    assert_eq!(header(&response, CACHE_CONTROL), Some("no-store"));
    let cookie = header(&response, SET_COOKIE).expect("cookie set");
    assert!(cookie.starts_with(&format!("{PREVIEW_COOKIE}=")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
}

#[tokio::test]
async fn unresolvable_targets_redirect_home() {
    let app = harness(Options::default());
    let response = get(
        &app.public,
        "/api/preview?secret=abc123&documentType=settings",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(header(&response, LOCATION), Some("/"));
}

#[tokio::test]
async fn wrong_or_missing_secret_is_rejected_without_a_cookie() {
    let app = harness(Options::default());
    for uri in [
        "/api/preview?secret=xyz999&documentType=post&slug=hello-world",
        "/api/preview?documentType=post&slug=hello-world",
        "/api/preview?secret=",
    ] {
        let response = get(&app.public, uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert!(header(&response, SET_COOKIE).is_none(), "{uri}");
        assert_eq!(body_text(response).await, "Invalid secret");
    }
}

#[tokio::test]
async fn secret_past_its_window_is_rejected_without_a_cookie() {
    let app = harness(Options {
        issued_ago: time::Duration::minutes(61),
        ..Options::default()
    });
    let response = get(
        &app.public,
        "/api/preview?secret=abc123&documentType=post&slug=hello-world",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(header(&response, SET_COOKIE).is_none());
    assert_eq!(body_text(response).await, "Invalid secret");
    assert_eq!(app.backend.write_count(), 0);
}

#[tokio::test]
async fn missing_read_token_is_a_misconfiguration() {
    let app = harness(Options {
        read_token: None,
        ..Options::default()
    });
    let response = get(&app.public, "/api/preview?secret=abc123", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(header(&response, SET_COOKIE).is_none());
    assert_eq!(body_text(response).await, "Service misconfigured");
}

#[tokio::test]
async fn disabling_clears_the_cookie_and_redirects_home() {
    let app = harness(Options::default());
    let session = open_session(&app.public).await;

    for path in ["/api/disable-preview", "/api/exit-preview"] {
        let response = get(&app.public, path, Some(&session)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(header(&response, LOCATION), Some("/"));
        let cookie = header(&response, SET_COOKIE).expect("removal cookie");
        assert!(cookie.starts_with(&format!("{PREVIEW_COOKIE}=")));
        assert!(cookie.contains("Max-Age=0"));
    }
}

#[tokio::test]
async fn drafts_are_visible_only_with_a_session() {
    let app = harness(Options::default());

    let public = get(&app.public, "/blog/writing-previews", None).await;
    assert_eq!(public.status(), StatusCode::NOT_FOUND);

    let published = body_text(get(&app.public, "/blog/hello-world", None).await).await;
    assert!(published.contains("This post is live for every visitor."));
    assert!(!published.contains("/api/disable-preview"));

    let session = open_session(&app.public).await;
    let draft = get(&app.public, "/blog/writing-previews", Some(&session)).await;
    assert_eq!(draft.status(), StatusCode::OK);
    assert_eq!(header(&draft, CACHE_CONTROL), Some("no-store"));
    let html = body_text(draft).await;
    assert!(html.contains("Writing with previews"));
    assert!(html.contains("/api/disable-preview"));

    let edited = body_text(get(&app.public, "/blog/hello-world", Some(&session)).await).await;
    assert!(edited.contains("This paragraph only appears in preview."));
}

#[tokio::test]
async fn unsigned_session_cookies_are_ignored() {
    let app = harness(Options::default());
    let forged = format!("{PREVIEW_COOKIE}=drafts");
    let response = get(&app.public, "/blog/writing-previews", Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cached_pages_never_leak_drafts() {
    let app = harness(Options {
        cache: true,
        ..Options::default()
    });

    let first = body_text(get(&app.public, "/blog/hello-world", None).await).await;
    assert!(first.contains("This post is live"));

    let session = open_session(&app.public).await;
    let preview = get(&app.public, "/blog/hello-world", Some(&session)).await;
    assert_eq!(header(&preview, CACHE_CONTROL), Some("no-store"));
    assert!(
        body_text(preview)
            .await
            .contains("This paragraph only appears in preview.")
    );

    let again = body_text(get(&app.public, "/blog/hello-world", None).await).await;
    assert!(again.contains("This post is live"));
    assert!(!again.contains("only appears in preview"));
}

#[tokio::test]
async fn listing_pages_and_static_pages_render() {
    let app = harness(Options::default());

    let blog = body_text(get(&app.public, "/blog", None).await).await;
    assert!(blog.contains("/blog/hello-world"));
    assert!(blog.contains("/blog/category/news"));
    assert!(!blog.contains("writing-previews"));

    let category = get(&app.public, "/blog/category/news", None).await;
    assert_eq!(category.status(), StatusCode::OK);
    assert!(body_text(category).await.contains("Hello, world"));

    let about = get(&app.public, "/about", None).await;
    assert_eq!(about.status(), StatusCode::OK);
    assert!(body_text(about).await.contains("We write about publishing workflows."));

    let missing = get(&app.public, "/no/such/page", None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let health = get(&app.public, "/_health", None).await;
    assert_eq!(health.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn pane_shows_notice_until_the_document_has_a_slug() {
    let app = harness(Options::default());

    let notice = body_text(get(&app.studio, "/preview-pane?documentType=post", None).await).await;
    assert!(notice.contains("Please add a slug to the post to see the preview!"));
    assert!(!notice.contains("preview-frame"));

    let shell = get(
        &app.studio,
        "/preview-pane?documentType=post&slug=hello-world",
        None,
    )
    .await;
    assert_eq!(header(&shell, CACHE_CONTROL), Some("no-store"));
    let html = body_text(shell).await;
    assert!(html.contains("id=\"preview-frame\""));
    assert!(html.contains("/preview-pane/frame?documentType=post"));
    assert!(!html.contains(SECRET));
}

#[tokio::test]
async fn pane_frame_streams_the_activation_url() {
    let app = harness(Options::default());
    let request = Request::builder()
        .uri("/preview-pane/frame?documentType=post&slug=hello-world")
        .header("datastar-request", "true")
        .body(Body::empty())
        .expect("request");
    let response = app.studio.clone().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        header(&response, CONTENT_TYPE)
            .is_some_and(|value| value.starts_with("text/event-stream"))
    );
    let body = body_text(response).await;
    assert!(body.contains("datastar-patch-elements"));
    assert!(body.contains("<iframe"));
    assert!(body.contains("secret=abc123"));
}

#[tokio::test]
async fn production_url_carries_the_current_secret() {
    let app = harness(Options::default());

    let response = get(
        &app.studio,
        "/production-url?documentType=post&slug=hello-world",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(
        body["url"],
        "http://localhost:3000/api/preview?documentType=post&slug=hello-world&secret=abc123"
    );

    let unresolvable = get(&app.studio, "/production-url?documentType=post", None).await;
    let body: Value = serde_json::from_str(&body_text(unresolvable).await).expect("json");
    assert!(body["url"].is_null());
}

#[tokio::test]
async fn studio_rotation_retires_the_old_secret() {
    let app = harness(Options::default());

    let request = Request::builder()
        .method("POST")
        .uri("/preview-pane/rotate-secret")
        .body(Body::empty())
        .expect("request");
    let response = app.studio.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.backend.write_count(), 1);

    let stored = app.backend.document("preview.secret").expect("secret stored");
    let fresh = stored["secret"].as_str().expect("secret value").to_string();
    assert_ne!(fresh, SECRET);

    let old = get(&app.public, "/api/preview?secret=abc123", None).await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = get(&app.public, &format!("/api/preview?secret={fresh}"), None).await;
    assert_eq!(new.status(), StatusCode::TEMPORARY_REDIRECT);

    let url = get(
        &app.studio,
        "/production-url?documentType=page&slug=about",
        None,
    )
    .await;
    let body: Value = serde_json::from_str(&body_text(url).await).expect("json");
    assert!(
        body["url"]
            .as_str()
            .is_some_and(|url| url.ends_with(&format!("secret={fresh}")))
    );
}

#[tokio::test]
async fn pane_stops_handing_out_a_secret_once_it_expires() {
    let app = harness(Options {
        secret_validity: time::Duration::seconds(2),
        issued_ago: time::Duration::ZERO,
        ..Options::default()
    });

    assert_eq!(production_secret(&app.studio).await, SECRET);

    tokio::time::sleep(Duration::from_millis(2200)).await;

    let fresh = production_secret(&app.studio).await;
    assert_ne!(fresh, SECRET);
    let response = get(
        &app.public,
        &format!("/api/preview?secret={fresh}&documentType=post&slug=hello-world"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(header(&response, SET_COOKIE).is_some());
}

/// Backend that never answers in time.
struct StalledBackend;

#[async_trait]
impl ContentBackend for StalledBackend {
    async fn query(
        &self,
        _config: &ClientConfig,
        _query: &ContentQuery,
    ) -> Result<Value, RepoError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(RepoError::Timeout)
    }

    async fn create_or_replace(
        &self,
        _config: &ClientConfig,
        _document: Value,
    ) -> Result<(), RepoError> {
        Err(RepoError::unavailable("stalled"))
    }
}

#[tokio::test]
async fn pane_frame_reports_a_stalled_backend_with_a_retry() {
    let token = BearerToken::new("sk-read").expect("token");
    let selector = ContentClientSelector::new(Arc::new(StalledBackend), Some(token), None);
    let pane = PreviewPaneService::new(
        selector,
        SecretStore::default(),
        SecretId::default(),
        Url::parse("http://localhost:3000").expect("site url"),
        Arc::new(SecretCache::new(
            Duration::from_secs(60),
            Duration::from_millis(50),
        )),
    );
    let studio = build_studio_router(StudioState {
        pane: Arc::new(pane),
    });

    let response = get(
        &studio,
        "/preview-pane/frame?documentType=post&slug=hello-world",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("The preview could not be loaded."));
    assert!(html.contains("Retry"));
    assert!(html.contains("/preview-pane/frame?documentType=post"));
    assert!(!html.contains("<iframe"));

    let quoted = get(
        &studio,
        "/preview-pane/frame?documentType=post&slug=x%27%29%3Bfoo",
        None,
    )
    .await;
    let html = body_text(quoted).await;
    assert!(html.contains("slug=x%27%29%3Bfoo"));
    assert!(!html.contains("x&#39;"));
    assert!(!html.contains("x');"));

    let url = get(
        &studio,
        "/production-url?documentType=post&slug=hello-world",
        None,
    )
    .await;
    assert_eq!(url.status(), StatusCode::SERVICE_UNAVAILABLE);
}
