//! Content payloads read from the backend.
//!
//! Only the fields the site renders are modelled; everything else in a
//! document is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::links::resolve_href;

/// Prefix the backend uses for unpublished working copies.
pub const DRAFTS_PREFIX: &str = "drafts.";

pub fn is_draft_id(id: &str) -> bool {
    id.starts_with(DRAFTS_PREFIX)
}

/// Id of the published counterpart of a (possibly draft) document id.
pub fn published_id(id: &str) -> &str {
    id.strip_prefix(DRAFTS_PREFIX).unwrap_or(id)
}

/// A slug stored either as a plain string or as a `{ "current": ... }` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Slug(pub String);

impl Slug {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Plain(String),
            Object { current: Option<String> },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Plain(value) => Ok(Slug(value)),
            Raw::Object { current } => Ok(Slug(current.unwrap_or_default())),
        }
    }
}

/// A (document type, slug) pair that can be turned into a site path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "documentType", default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl DocumentRef {
    pub fn new(document_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            document_type: Some(document_type.into()),
            slug: Some(slug.into()),
        }
    }

    /// Build a reference from a raw content document (`_type` + `slug`).
    pub fn from_document(document: &Value) -> Self {
        let document_type = document
            .get("_type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let slug = document
            .get("slug")
            .cloned()
            .and_then(|value| serde_json::from_value::<Slug>(value).ok())
            .map(|slug| slug.0);
        Self {
            document_type,
            slug,
        }
    }

    pub fn href(&self) -> Option<String> {
        resolve_href(self.document_type.as_deref(), self.slug.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomePagePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub overview: Option<Value>,
    #[serde(rename = "seoTitle", default)]
    pub seo_title: Option<String>,
    #[serde(rename = "seoDescription", default)]
    pub seo_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostPayload {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<Slug>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPayload {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<Slug>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<Slug>,
    #[serde(default)]
    pub overview: Option<Value>,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Flatten a rich-text value into plain paragraphs.
///
/// Accepts a plain string or an array of portable-text blocks; spans of each
/// block are concatenated and empty blocks are dropped.
pub fn plain_paragraphs(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) => text
            .split("\n\n")
            .map(str::trim)
            .filter(|paragraph| !paragraph.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("children").and_then(Value::as_array))
            .map(|children| {
                children
                    .iter()
                    .filter_map(|child| child.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .filter(|paragraph| !paragraph.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn draft_ids_map_to_published_ids() {
        assert!(is_draft_id("drafts.post-1"));
        assert!(!is_draft_id("post-1"));
        assert_eq!(published_id("drafts.post-1"), "post-1");
        assert_eq!(published_id("post-1"), "post-1");
    }

    #[test]
    fn slug_accepts_string_and_object_forms() {
        let plain: Slug = serde_json::from_value(json!("hello")).expect("plain");
        let object: Slug =
            serde_json::from_value(json!({ "_type": "slug", "current": "hello" })).expect("object");
        assert_eq!(plain, object);
    }

    #[test]
    fn document_ref_reads_type_and_slug_object() {
        let document = json!({
            "_id": "drafts.post-1",
            "_type": "post",
            "slug": { "_type": "slug", "current": "hello-world" },
        });
        let reference = DocumentRef::from_document(&document);
        assert_eq!(reference.href().as_deref(), Some("/blog/hello-world"));
    }

    #[test]
    fn document_ref_without_slug_is_not_previewable() {
        let document = json!({ "_id": "post-2", "_type": "post" });
        assert_eq!(DocumentRef::from_document(&document).href(), None);
    }

    #[test]
    fn portable_text_flattens_to_paragraphs() {
        let body = json!([
            { "_type": "block", "children": [{ "text": "Hello, " }, { "text": "world." }] },
            { "_type": "block", "children": [{ "text": "   " }] },
            { "_type": "image" },
            { "_type": "block", "children": [{ "text": "Second." }] },
        ]);
        assert_eq!(
            plain_paragraphs(Some(&body)),
            vec!["Hello, world.".to_string(), "Second.".to_string()]
        );
    }

    #[test]
    fn plain_text_splits_on_blank_lines() {
        let body = json!("One.\n\nTwo.\n\n");
        assert_eq!(plain_paragraphs(Some(&body)), vec!["One.", "Two."]);
        assert!(plain_paragraphs(None).is_empty());
    }
}
