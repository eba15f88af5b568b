//! Hosted content API adapter.
//!
//! Speaks the query and mutate endpoints of a Sanity-style content lake over
//! HTTPS. Public reads go through the CDN host; anything with a token goes
//! to the live API host.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::application::repos::{ClientConfig, ContentBackend, RepoError};
use crate::domain::queries::ContentQuery;

const API_DOMAIN: &str = "sanity.io";

/// Connection details for the hosted backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpContentBackend {
    client: Client,
    config: HttpBackendConfig,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(default)]
    result: Value,
}

impl HttpContentBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, RepoError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RepoError::unavailable(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn user_agent() -> &'static str {
        concat!("vetrina/", env!("CARGO_PKG_VERSION"))
    }

    fn endpoint(&self, use_cdn: bool, action: &str) -> Result<Url, RepoError> {
        let host = if use_cdn { "apicdn" } else { "api" };
        let raw = format!(
            "https://{project}.{host}.{API_DOMAIN}/v{version}/data/{action}/{dataset}",
            project = self.config.project_id,
            version = self.config.api_version,
            dataset = self.config.dataset,
        );
        Url::parse(&raw)
            .map_err(|err| RepoError::unavailable(format!("invalid endpoint `{raw}`: {err}")))
    }

    /// Full query URL with GROQ text, JSON-encoded parameters and perspective.
    pub fn query_url(
        &self,
        config: &ClientConfig,
        query: &ContentQuery,
    ) -> Result<Url, RepoError> {
        let mut url = self.endpoint(config.use_cdn, "query")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", &query.groq());
            for (name, value) in query.params() {
                pairs.append_pair(&format!("${name}"), &value.to_string());
            }
            pairs.append_pair("perspective", config.perspective.as_str());
        }
        Ok(url)
    }

    fn authorize(request: RequestBuilder, config: &ClientConfig) -> RequestBuilder {
        match config.token.as_ref() {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    async fn read_body(response: Response) -> Result<Value, RepoError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport)?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(map_status(status, text));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| RepoError::invalid_response(format!("failed to parse body: {err}")))
    }
}

#[async_trait]
impl ContentBackend for HttpContentBackend {
    async fn query(
        &self,
        config: &ClientConfig,
        query: &ContentQuery,
    ) -> Result<Value, RepoError> {
        let url = self.query_url(config, query)?;
        debug!(
            target = "vetrina::content::http",
            query = query.name(),
            host = url.host_str().unwrap_or_default(),
            "sending content query"
        );

        let request = Self::authorize(self.client.get(url), config);
        let response = request.send().await.map_err(map_transport)?;
        let body = Self::read_body(response).await?;
        let envelope: QueryEnvelope = serde_json::from_value(body)
            .map_err(|err| RepoError::invalid_response(format!("missing result: {err}")))?;
        Ok(envelope.result)
    }

    async fn create_or_replace(
        &self,
        config: &ClientConfig,
        document: Value,
    ) -> Result<(), RepoError> {
        if !config.is_authenticated() {
            return Err(RepoError::unauthorized("mutations require a token"));
        }
        let url = self.endpoint(false, "mutate")?;
        let body = json!({ "mutations": [{ "createOrReplace": document }] });

        let request = Self::authorize(self.client.post(url), config).json(&body);
        let response = request.send().await.map_err(map_transport)?;
        Self::read_body(response).await?;
        Ok(())
    }
}

fn map_transport(err: reqwest::Error) -> RepoError {
    if err.is_timeout() {
        RepoError::Timeout
    } else {
        RepoError::unavailable(err.to_string())
    }
}

fn map_status(status: StatusCode, body: String) -> RepoError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RepoError::unauthorized(format!("status {status} body {body}"))
        }
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => RepoError::Timeout,
        status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            RepoError::unavailable(format!("status {status} body {body}"))
        }
        status => RepoError::invalid_response(format!("status {status} body {body}")),
    }
}
