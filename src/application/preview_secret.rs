//! Lookup and lazy rotation of the preview capability secret.

use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::domain::{
    error::DomainError,
    preview_secret::{PreviewSecret, SECRET_VALIDITY, SecretId},
    queries::ContentQuery,
};

use super::content::{ContentClient, ContentError};

const METRIC_SECRET_ROTATIONS: &str = "vetrina_preview_secret_rotations_total";

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Reads the secret document and supersedes it once it ages out.
///
/// Clients passed in must be authenticated; the secret id is a private path.
#[derive(Debug, Clone, Copy)]
pub struct SecretStore {
    validity: Duration,
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new(SECRET_VALIDITY)
    }
}

impl SecretStore {
    pub fn new(validity: Duration) -> Self {
        Self { validity }
    }

    /// Current secret value, minting one when absent or expired and allowed to.
    pub async fn get_or_create(
        &self,
        client: &ContentClient,
        id: &SecretId,
        create_if_missing: bool,
    ) -> Result<Option<String>, SecretStoreError> {
        self.get_or_create_at(client, id, create_if_missing, OffsetDateTime::now_utc())
            .await
    }

    pub async fn get_or_create_at(
        &self,
        client: &ContentClient,
        id: &SecretId,
        create_if_missing: bool,
        now: OffsetDateTime,
    ) -> Result<Option<String>, SecretStoreError> {
        let secret = self.secret_at(client, id, create_if_missing, now).await?;
        Ok(secret.map(|secret| secret.value))
    }

    /// Like [`Self::get_or_create_at`] but keeps the issue time, so callers
    /// can tell how long the value stays usable.
    pub async fn secret_at(
        &self,
        client: &ContentClient,
        id: &SecretId,
        create_if_missing: bool,
        now: OffsetDateTime,
    ) -> Result<Option<PreviewSecret>, SecretStoreError> {
        if let Some(secret) = self.current(client, id, now).await? {
            return Ok(Some(secret));
        }
        if !create_if_missing {
            return Ok(None);
        }
        self.rotate_at(client, id, now).await.map(Some)
    }

    /// Time until `secret` stops being accepted; zero once it has expired.
    pub fn remaining(&self, secret: &PreviewSecret, now: OffsetDateTime) -> std::time::Duration {
        std::time::Duration::try_from(secret.expires_at(self.validity) - now).unwrap_or_default()
    }

    /// The stored secret if it is still inside its validity window.
    pub async fn current(
        &self,
        client: &ContentClient,
        id: &SecretId,
        now: OffsetDateTime,
    ) -> Result<Option<PreviewSecret>, SecretStoreError> {
        let document = client
            .raw(&ContentQuery::DocumentById(id.as_str().to_string()))
            .await?;
        let secret = PreviewSecret::from_document(id, document)?;
        Ok(secret.filter(|secret| secret.is_valid_at(now, self.validity)))
    }

    /// Unconditionally replace the stored secret with a fresh one.
    ///
    /// Concurrent rotations race; the last write wins.
    pub async fn rotate_at(
        &self,
        client: &ContentClient,
        id: &SecretId,
        now: OffsetDateTime,
    ) -> Result<PreviewSecret, SecretStoreError> {
        let secret = PreviewSecret::generate(id.clone(), now);
        client.create_or_replace(secret.to_document()?).await?;

        counter!(METRIC_SECRET_ROTATIONS).increment(1);
        info!(
            target = "vetrina::preview::secret",
            secret_id = %id,
            created_at = %secret.created_at,
            expires_at = %secret.expires_at(self.validity),
            "preview secret rotated"
        );

        Ok(secret)
    }
}
