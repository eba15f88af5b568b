//! Capability secret that gates draft previews.
//!
//! The secret lives as a single document in the content backend. Its id is a
//! private path (it contains a `.`), so the backend only serves it to
//! token-bearing clients.

use std::fmt::{Display, Formatter};

use serde::Deserialize;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use super::error::DomainError;

/// Document id used for the preview secret stored in the dataset.
pub const PREVIEW_SECRET_ID: &str = "preview.secret";

/// Lifetime of a secret, measured from its creation.
pub const SECRET_VALIDITY: Duration = Duration::minutes(60);

/// Fixed logical key of a secret document (`<namespace>.<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretId(String);

impl SecretId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let valid = value
            .split_once('.')
            .is_some_and(|(namespace, name)| !namespace.is_empty() && !name.is_empty());
        if !valid || value.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(format!(
                "secret id `{value}` must have the form `<namespace>.<name>`"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SecretId {
    fn default() -> Self {
        Self(PREVIEW_SECRET_ID.to_string())
    }
}

impl Display for SecretId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PreviewSecret {
    pub id: SecretId,
    pub value: String,
    pub created_at: OffsetDateTime,
}

impl std::fmt::Debug for PreviewSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSecret")
            .field("id", &self.id)
            .field("value", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl PreviewSecret {
    /// Mint a fresh secret from the OS random source.
    pub fn generate(id: SecretId, now: OffsetDateTime) -> Self {
        let value = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self {
            id,
            value,
            created_at: now,
        }
    }

    pub fn expires_at(&self, validity: Duration) -> OffsetDateTime {
        self.created_at + validity
    }

    pub fn is_valid_at(&self, now: OffsetDateTime, validity: Duration) -> bool {
        now < self.expires_at(validity)
    }

    /// Compare a presented value against this secret in constant time.
    pub fn matches(&self, candidate: &str) -> bool {
        self.value.as_bytes().ct_eq(candidate.as_bytes()).unwrap_u8() == 1
    }

    pub fn to_document(&self) -> Result<Value, DomainError> {
        let issued_at = self
            .created_at
            .format(&Rfc3339)
            .map_err(|err| DomainError::invariant(format!("unformattable timestamp: {err}")))?;
        Ok(json!({
            "_id": self.id.as_str(),
            "_type": self.id.as_str(),
            "secret": self.value,
            "issuedAt": issued_at,
        }))
    }

    /// Decode a stored secret document.
    ///
    /// Documents without a secret value or without any timestamp are treated
    /// as absent. `issuedAt` wins over the backend-maintained `_updatedAt`.
    pub fn from_document(id: &SecretId, document: Value) -> Result<Option<Self>, DomainError> {
        if document.is_null() {
            return Ok(None);
        }

        let stored: StoredSecret = serde_json::from_value(document)
            .map_err(|err| DomainError::validation(format!("malformed secret document: {err}")))?;

        if stored.id != id.as_str() {
            return Err(DomainError::invariant(format!(
                "expected secret document `{id}`, received `{}`",
                stored.id
            )));
        }

        let Some(value) = stored.secret.filter(|value| !value.is_empty()) else {
            return Ok(None);
        };
        let Some(created_at) = stored.issued_at.or(stored.updated_at) else {
            return Ok(None);
        };

        Ok(Some(Self {
            id: id.clone(),
            value,
            created_at,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct StoredSecret {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    secret: Option<String>,
    #[serde(rename = "issuedAt", default, with = "time::serde::rfc3339::option")]
    issued_at: Option<OffsetDateTime>,
    #[serde(rename = "_updatedAt", default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn secret_id_requires_namespace_and_name() {
        assert!(SecretId::new("preview.secret").is_ok());
        assert!(SecretId::new("preview").is_err());
        assert!(SecretId::new(".secret").is_err());
        assert!(SecretId::new("preview.").is_err());
        assert!(SecretId::new("preview. secret").is_err());
        assert_eq!(SecretId::default().as_str(), PREVIEW_SECRET_ID);
    }

    #[test]
    fn generated_secrets_are_long_and_distinct() {
        let now = datetime!(2026-01-01 12:00 UTC);
        let first = PreviewSecret::generate(SecretId::default(), now);
        let second = PreviewSecret::generate(SecretId::default(), now);
        assert_eq!(first.value.len(), 64);
        assert_ne!(first.value, second.value);
    }

    #[test]
    fn validity_window_is_half_open() {
        let created = datetime!(2026-01-01 12:00 UTC);
        let secret = PreviewSecret {
            id: SecretId::default(),
            value: "abc123".into(),
            created_at: created,
        };
        assert!(secret.is_valid_at(created + Duration::minutes(59), SECRET_VALIDITY));
        assert!(!secret.is_valid_at(created + Duration::minutes(60), SECRET_VALIDITY));
    }

    #[test]
    fn matches_exact_value_only() {
        let secret = PreviewSecret {
            id: SecretId::default(),
            value: "abc123".into(),
            created_at: datetime!(2026-01-01 12:00 UTC),
        };
        assert!(secret.matches("abc123"));
        assert!(!secret.matches("abc12"));
        assert!(!secret.matches("xyz999"));
        assert!(!secret.matches(""));
    }

    #[test]
    fn document_round_trip_preserves_issue_time() {
        let secret = PreviewSecret {
            id: SecretId::default(),
            value: "abc123".into(),
            created_at: datetime!(2026-01-01 12:00 UTC),
        };
        let document = secret.to_document().expect("document");
        let decoded = PreviewSecret::from_document(&SecretId::default(), document)
            .expect("decodes")
            .expect("present");
        assert_eq!(decoded, secret);
    }

    #[test]
    fn falls_back_to_backend_update_time() {
        let document = json!({
            "_id": "preview.secret",
            "_type": "preview.secret",
            "secret": "abc123",
            "_updatedAt": "2026-01-01T12:00:00Z",
        });
        let decoded = PreviewSecret::from_document(&SecretId::default(), document)
            .expect("decodes")
            .expect("present");
        assert_eq!(decoded.created_at, datetime!(2026-01-01 12:00 UTC));
    }

    #[test]
    fn incomplete_documents_are_absent() {
        let id = SecretId::default();
        assert!(
            PreviewSecret::from_document(&id, Value::Null)
                .expect("null")
                .is_none()
        );
        let no_secret = json!({ "_id": "preview.secret", "_updatedAt": "2026-01-01T12:00:00Z" });
        assert!(
            PreviewSecret::from_document(&id, no_secret)
                .expect("decodes")
                .is_none()
        );
        let no_time = json!({ "_id": "preview.secret", "secret": "abc123" });
        assert!(
            PreviewSecret::from_document(&id, no_time)
                .expect("decodes")
                .is_none()
        );
    }

    #[test]
    fn mismatched_document_id_is_an_invariant_violation() {
        let document = json!({ "_id": "other.secret", "secret": "abc123" });
        let err = PreviewSecret::from_document(&SecretId::default(), document).unwrap_err();
        assert!(matches!(err, DomainError::Invariant { .. }));
    }
}
