//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, ContentOverrides, RotateSecretArgs, ServeArgs, ServeOverrides};

use crate::application::repos::BearerToken;
use crate::domain::preview_secret::{PREVIEW_SECRET_ID, SecretId};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vetrina";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_STUDIO_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_STUDIO_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DATASET: &str = "production";
const DEFAULT_API_VERSION: &str = "2024-01-01";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SITE_URL: &str = "http://localhost:3000";
const DEFAULT_SECRET_TTL_MINUTES: u64 = 60;
const MAX_SECRET_TTL_MINUTES: u64 = 7 * 24 * 60;
const DEFAULT_SECRET_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_SECRET_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_L1_RESPONSE_LIMIT: usize = 200;
const DEFAULT_L1_TTL_SECS: u64 = 60;
const MIN_COOKIE_KEY_BYTES: usize = 64;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub content: ContentSettings,
    pub preview: PreviewSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub studio_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentBackendKind {
    /// Hosted content API over HTTPS.
    Http,
    /// In-process store, optionally seeded from an NDJSON export.
    Memory,
}

impl FromStr for ContentBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend `{other}`, expected http or memory")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub backend: ContentBackendKind,
    pub project_id: Option<String>,
    pub dataset: String,
    pub api_version: String,
    pub read_token: Option<BearerToken>,
    pub write_token: Option<BearerToken>,
    pub seed_file: Option<PathBuf>,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct PreviewSettings {
    pub site_url: Url,
    /// Signing key for the preview cookie; generated per process when unset.
    pub cookie_key: Option<Vec<u8>>,
    pub secret_id: SecretId,
    pub secret_ttl: time::Duration,
    pub secret_cache_ttl: Duration,
    pub secret_timeout: Duration,
}

impl std::fmt::Debug for PreviewSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSettings")
            .field("site_url", &self.site_url.as_str())
            .field("cookie_key", &self.cookie_key.as_ref().map(|_| "<redacted>"))
            .field("secret_id", &self.secret_id)
            .field("secret_ttl", &self.secret_ttl)
            .field("secret_cache_ttl", &self.secret_cache_ttl)
            .field("secret_timeout", &self.secret_timeout)
            .finish()
    }
}

impl PreviewSettings {
    /// Cookies must be `Secure` + `SameSite=None` to survive inside the studio iframe.
    pub fn secure_cookies(&self) -> bool {
        self.site_url.scheme() == "https"
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_l1_cache: bool,
    pub l1_response_limit: usize,
    pub l1_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VETRINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::RotateSecret(args)) => raw.apply_content_overrides(&args.content),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    content: RawContentSettings,
    preview: RawPreviewSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_studio_host.as_ref() {
            self.server.studio_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.studio_port {
            self.server.studio_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.preview_site_url.as_ref() {
            self.preview.site_url = Some(url.clone());
        }
        if let Some(timeout) = overrides.preview_secret_timeout_ms {
            self.preview.secret_timeout_ms = Some(timeout);
        }
        if let Some(enabled) = overrides.cache_enable_l1_cache {
            self.cache.enable_l1_cache = Some(enabled);
        }
        if let Some(limit) = overrides.cache_l1_response_limit {
            self.cache.l1_response_limit = Some(limit);
        }
        if let Some(ttl) = overrides.cache_l1_ttl_seconds {
            self.cache.l1_ttl_seconds = Some(ttl);
        }

        self.apply_content_overrides(&overrides.content);
    }

    fn apply_content_overrides(&mut self, overrides: &ContentOverrides) {
        if let Some(backend) = overrides.backend.as_ref() {
            self.content.backend = Some(backend.clone());
        }
        if let Some(project_id) = overrides.project_id.as_ref() {
            self.content.project_id = Some(project_id.clone());
        }
        if let Some(dataset) = overrides.dataset.as_ref() {
            self.content.dataset = Some(dataset.clone());
        }
        if let Some(path) = overrides.seed_file.as_ref() {
            self.content.seed_file = Some(path.clone());
        }
        if let Some(token) = overrides.read_token.as_ref() {
            self.content.read_token = Some(token.clone());
        }
        if let Some(token) = overrides.write_token.as_ref() {
            self.content.write_token = Some(token.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            content,
            preview,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let content = build_content_settings(content)?;
        let preview = build_preview_settings(preview)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            logging,
            content,
            preview,
            cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let studio_host = server
        .studio_host
        .unwrap_or_else(|| DEFAULT_STUDIO_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let studio_port = server.studio_port.unwrap_or(DEFAULT_STUDIO_PORT);
    if studio_port == 0 {
        return Err(LoadError::invalid(
            "server.studio_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let studio_addr = parse_socket_addr(&studio_host, studio_port)
        .map_err(|reason| LoadError::invalid("server.studio_addr", reason))?;
    if public_addr == studio_addr {
        return Err(LoadError::invalid(
            "server.studio_port",
            "studio listener must not share the public address",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        studio_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let backend = match content.backend.as_deref() {
        Some(value) => ContentBackendKind::from_str(value)
            .map_err(|reason| LoadError::invalid("content.backend", reason))?,
        None => ContentBackendKind::Memory,
    };

    let project_id = non_blank(content.project_id);
    if backend == ContentBackendKind::Http {
        match project_id.as_deref() {
            None => {
                return Err(LoadError::invalid(
                    "content.project_id",
                    "required for the http backend",
                ));
            }
            Some(id) if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') => {
                return Err(LoadError::invalid(
                    "content.project_id",
                    "must contain only letters, digits and dashes",
                ));
            }
            Some(_) => {}
        }
    }

    let dataset = non_blank(content.dataset).unwrap_or_else(|| DEFAULT_DATASET.to_string());
    let api_version = non_blank(content.api_version)
        .map(|version| version.trim_start_matches('v').to_string())
        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

    let timeout_ms = content
        .request_timeout_ms
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "content.request_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(ContentSettings {
        backend,
        project_id,
        dataset,
        api_version,
        read_token: content.read_token.and_then(BearerToken::new),
        write_token: content.write_token.and_then(BearerToken::new),
        seed_file: content.seed_file.filter(|path| !path.as_os_str().is_empty()),
        request_timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_preview_settings(preview: RawPreviewSettings) -> Result<PreviewSettings, LoadError> {
    let raw_url = non_blank(preview.site_url).unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let site_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("preview.site_url", format!("{raw_url}: {err}")))?;
    if !matches!(site_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "preview.site_url",
            "scheme must be http or https",
        ));
    }

    let cookie_key = match non_blank(preview.cookie_key) {
        Some(encoded) => {
            let bytes = BASE64.decode(encoded.as_bytes()).map_err(|err| {
                LoadError::invalid("preview.cookie_key", format!("not valid base64: {err}"))
            })?;
            if bytes.len() < MIN_COOKIE_KEY_BYTES {
                return Err(LoadError::invalid(
                    "preview.cookie_key",
                    format!("must decode to at least {MIN_COOKIE_KEY_BYTES} bytes"),
                ));
            }
            Some(bytes)
        }
        None => None,
    };

    let secret_id = SecretId::new(
        non_blank(preview.secret_id).unwrap_or_else(|| PREVIEW_SECRET_ID.to_string()),
    )
    .map_err(|err| LoadError::invalid("preview.secret_id", err.to_string()))?;

    let ttl_minutes = preview
        .secret_ttl_minutes
        .unwrap_or(DEFAULT_SECRET_TTL_MINUTES);
    if ttl_minutes == 0 || ttl_minutes > MAX_SECRET_TTL_MINUTES {
        return Err(LoadError::invalid(
            "preview.secret_ttl_minutes",
            format!("must be between 1 and {MAX_SECRET_TTL_MINUTES}"),
        ));
    }
    let ttl_minutes = i64::try_from(ttl_minutes)
        .map_err(|_| LoadError::invalid("preview.secret_ttl_minutes", "out of range"))?;

    let cache_ttl = preview
        .secret_cache_ttl_seconds
        .unwrap_or(DEFAULT_SECRET_CACHE_TTL_SECS);
    if cache_ttl == 0 {
        return Err(LoadError::invalid(
            "preview.secret_cache_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let timeout_ms = preview
        .secret_timeout_ms
        .unwrap_or(DEFAULT_SECRET_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "preview.secret_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(PreviewSettings {
        site_url,
        cookie_key,
        secret_id,
        secret_ttl: time::Duration::minutes(ttl_minutes),
        secret_cache_ttl: Duration::from_secs(cache_ttl),
        secret_timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let l1_response_limit = cache
        .l1_response_limit
        .unwrap_or(DEFAULT_L1_RESPONSE_LIMIT);
    if l1_response_limit == 0 {
        return Err(LoadError::invalid(
            "cache.l1_response_limit",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enable_l1_cache: cache.enable_l1_cache.unwrap_or(true),
        l1_response_limit,
        l1_ttl: Duration::from_secs(cache.l1_ttl_seconds.unwrap_or(DEFAULT_L1_TTL_SECS)),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    studio_host: Option<String>,
    public_port: Option<u16>,
    studio_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    backend: Option<String>,
    project_id: Option<String>,
    dataset: Option<String>,
    api_version: Option<String>,
    read_token: Option<String>,
    write_token: Option<String>,
    seed_file: Option<PathBuf>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPreviewSettings {
    site_url: Option<String>,
    cookie_key: Option<String>,
    secret_id: Option<String>,
    secret_ttl_minutes: Option<u64>,
    secret_cache_ttl_seconds: Option<u64>,
    secret_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_l1_cache: Option<bool>,
    l1_response_limit: Option<usize>,
    l1_ttl_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
