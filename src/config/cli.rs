use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Vetrina binary.
#[derive(Debug, Parser)]
#[command(name = "vetrina", version, about = "Vetrina site and preview server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VETRINA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public site and studio listeners.
    Serve(Box<ServeArgs>),
    /// Replace the preview secret with a freshly generated one.
    #[command(name = "rotate-secret")]
    RotateSecret(RotateSecretArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ContentOverrides {
    /// Override the content backend kind (http|memory).
    #[arg(long = "content-backend", value_name = "KIND")]
    pub backend: Option<String>,

    /// Override the content project id.
    #[arg(long = "content-project-id", value_name = "ID")]
    pub project_id: Option<String>,

    /// Override the content dataset.
    #[arg(long = "content-dataset", value_name = "NAME")]
    pub dataset: Option<String>,

    /// Override the NDJSON seed file for the in-memory backend.
    #[arg(
        long = "content-seed-file",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub seed_file: Option<PathBuf>,

    /// Token used for draft reads and secret validation.
    #[arg(
        long = "content-read-token",
        env = "VETRINA_CONTENT_READ_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub read_token: Option<String>,

    /// Token used to write the preview secret; defaults to the read token.
    #[arg(
        long = "content-write-token",
        env = "VETRINA_CONTENT_WRITE_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub write_token: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub content: ContentOverrides,

    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the studio listener host.
    #[arg(long = "server-studio-host", value_name = "HOST")]
    pub server_studio_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the studio listener port.
    #[arg(long = "server-studio-port", value_name = "PORT")]
    pub studio_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the public site URL used in preview links.
    #[arg(long = "preview-site-url", value_name = "URL")]
    pub preview_site_url: Option<String>,

    /// Override the preview-pane secret fetch timeout in milliseconds.
    #[arg(long = "preview-secret-timeout-ms", value_name = "MS")]
    pub preview_secret_timeout_ms: Option<u64>,

    /// Enable the L1 response cache.
    #[arg(
        long = "cache-enable-l1-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable_l1_cache: Option<bool>,

    /// Override the L1 response limit.
    #[arg(long = "cache-l1-response-limit", value_name = "COUNT")]
    pub cache_l1_response_limit: Option<usize>,

    /// Override the L1 response lifetime in seconds.
    #[arg(long = "cache-l1-ttl-seconds", value_name = "SECONDS")]
    pub cache_l1_ttl_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RotateSecretArgs {
    #[command(flatten)]
    pub content: ContentOverrides,
}
