//! The closed set of content queries the site issues.
//!
//! Each query carries its GROQ rendering for the hosted backend and a
//! matching predicate so local backends can evaluate it without a GROQ engine.

use std::cmp::Ordering;

use serde_json::Value;

const POST_FIELDS: &str =
    r#"_id, title, "slug": slug.current, excerpt, publishedAt, "categories": categories[]._ref"#;

/// Whether a query yields a single document (or null) or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentQuery {
    HomePage,
    BlogPosts,
    Categories,
    PostBySlug(String),
    PostsInCategory(String),
    CategoryBySlug(String),
    PageBySlug(String),
    DocumentById(String),
}

impl ContentQuery {
    /// Stable name used as request tag, log field and metric label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HomePage => "home_page",
            Self::BlogPosts => "blog_posts",
            Self::Categories => "categories",
            Self::PostBySlug(_) => "post_by_slug",
            Self::PostsInCategory(_) => "posts_in_category",
            Self::CategoryBySlug(_) => "category_by_slug",
            Self::PageBySlug(_) => "page_by_slug",
            Self::DocumentById(_) => "document_by_id",
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Self::BlogPosts | Self::Categories | Self::PostsInCategory(_) => Cardinality::Many,
            _ => Cardinality::One,
        }
    }

    pub fn groq(&self) -> String {
        match self {
            Self::HomePage => {
                r#"*[_type == "home"][0]{ _id, title, overview, seoTitle, seoDescription }"#
                    .to_string()
            }
            Self::BlogPosts => format!(
                r#"*[_type == "post" && defined(slug.current)] | order(publishedAt desc){{ {POST_FIELDS} }}"#
            ),
            Self::Categories => {
                r#"*[_type == "category" && defined(slug.current)] | order(title asc){ _id, title, "slug": slug.current, description }"#
                    .to_string()
            }
            Self::PostBySlug(_) => format!(
                r#"*[_type == "post" && slug.current == $slug][0]{{ {POST_FIELDS}, body }}"#
            ),
            Self::PostsInCategory(_) => format!(
                r#"*[_type == "post" && defined(slug.current) && references($id)] | order(publishedAt desc){{ {POST_FIELDS} }}"#
            ),
            Self::CategoryBySlug(_) => {
                r#"*[_type == "category" && slug.current == $slug][0]{ _id, title, "slug": slug.current, description }"#
                    .to_string()
            }
            Self::PageBySlug(_) => {
                r#"*[_type == "page" && slug.current == $slug][0]{ _id, title, "slug": slug.current, overview, body }"#
                    .to_string()
            }
            Self::DocumentById(_) => "*[_id == $id][0]".to_string(),
        }
    }

    /// Query parameters as `(name, value)` pairs, names without the `$` sigil.
    pub fn params(&self) -> Vec<(&'static str, Value)> {
        match self {
            Self::PostBySlug(slug) | Self::CategoryBySlug(slug) | Self::PageBySlug(slug) => {
                vec![("slug", Value::String(slug.clone()))]
            }
            Self::PostsInCategory(id) | Self::DocumentById(id) => {
                vec![("id", Value::String(id.clone()))]
            }
            Self::HomePage | Self::BlogPosts | Self::Categories => Vec::new(),
        }
    }

    /// Evaluate the query's filter against a raw document.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::HomePage => type_of(document) == Some("home"),
            Self::BlogPosts => type_of(document) == Some("post") && slug_of(document).is_some(),
            Self::Categories => {
                type_of(document) == Some("category") && slug_of(document).is_some()
            }
            Self::PostBySlug(slug) => {
                type_of(document) == Some("post") && slug_of(document) == Some(slug.as_str())
            }
            Self::PostsInCategory(id) => {
                type_of(document) == Some("post")
                    && slug_of(document).is_some()
                    && references(document, id)
            }
            Self::CategoryBySlug(slug) => {
                type_of(document) == Some("category") && slug_of(document) == Some(slug.as_str())
            }
            Self::PageBySlug(slug) => {
                type_of(document) == Some("page") && slug_of(document) == Some(slug.as_str())
            }
            Self::DocumentById(id) => {
                document.get("_id").and_then(Value::as_str) == Some(id.as_str())
            }
        }
    }

    /// Apply the query's ordering to matched documents.
    pub fn sort(&self, documents: &mut [Value]) {
        match self {
            Self::BlogPosts | Self::PostsInCategory(_) => {
                documents.sort_by(|a, b| compare_field(b, a, "publishedAt"));
            }
            Self::Categories => documents.sort_by(|a, b| compare_field(a, b, "title")),
            _ => {}
        }
    }
}

fn type_of(document: &Value) -> Option<&str> {
    document.get("_type").and_then(Value::as_str)
}

fn slug_of(document: &Value) -> Option<&str> {
    match document.get("slug")? {
        Value::String(slug) => Some(slug.as_str()),
        other => other.get("current").and_then(Value::as_str),
    }
}

fn references(document: &Value, id: &str) -> bool {
    match document {
        Value::Object(map) => map.iter().any(|(key, value)| {
            (key == "_ref" && value.as_str() == Some(id)) || references(value, id)
        }),
        Value::Array(items) => items.iter().any(|item| references(item, id)),
        _ => false,
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let left = a.get(field).and_then(Value::as_str);
    let right = b.get(field).and_then(Value::as_str);
    left.cmp(&right)
}
