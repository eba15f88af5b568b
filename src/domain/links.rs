//! Canonical site paths for content documents.
//!
//! The table of previewable document types is closed: adding a content type
//! that should be reachable on the site means adding a variant here.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use url::Url;

/// Base used only to borrow `url`'s path-segment encoder.
const SEGMENT_BASE: &str = "http://localhost/";

/// Document types that map onto a site path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Post,
    Category,
    Page,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Category => "category",
            Self::Page => "page",
        }
    }

    /// Path prefix under which documents of this type are served.
    pub fn path_prefix(self) -> &'static str {
        match self {
            Self::Post => "/blog/",
            Self::Category => "/blog/category/",
            Self::Page => "/",
        }
    }

    pub fn all() -> &'static [DocumentType] {
        &[Self::Post, Self::Category, Self::Page]
    }
}

impl Display for DocumentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Self::Post),
            "category" => Ok(Self::Category),
            "page" => Ok(Self::Page),
            _ => Err(()),
        }
    }
}

/// Map a document type and slug to the site path that renders it.
///
/// Returns `None` when the type is not previewable or the slug is missing or
/// blank; callers treat that as "not previewable yet", never as a failure.
pub fn resolve_href(document_type: Option<&str>, slug: Option<&str>) -> Option<String> {
    let document_type = document_type?.parse::<DocumentType>().ok()?;
    let slug = slug.map(str::trim).filter(|slug| !slug.is_empty())?;
    let segment = encode_segment(slug)?;
    Some(format!("{}{segment}", document_type.path_prefix()))
}

fn encode_segment(slug: &str) -> Option<String> {
    let mut url = Url::parse(SEGMENT_BASE).ok()?;
    url.path_segments_mut().ok()?.clear().push(slug);
    Some(url.path().trim_start_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_resolves_under_blog() {
        assert_eq!(
            resolve_href(Some("post"), Some("hello-world")).as_deref(),
            Some("/blog/hello-world")
        );
    }

    #[test]
    fn page_resolves_to_root_relative_path() {
        assert_eq!(
            resolve_href(Some("page"), Some("about")).as_deref(),
            Some("/about")
        );
    }

    #[test]
    fn category_resolves_under_blog_category() {
        assert_eq!(
            resolve_href(Some("category"), Some("rust")).as_deref(),
            Some("/blog/category/rust")
        );
    }

    #[test]
    fn unknown_type_is_not_resolvable() {
        assert_eq!(resolve_href(Some("unknownType"), Some("x")), None);
        assert_eq!(resolve_href(None, Some("x")), None);
    }

    #[test]
    fn missing_or_blank_slug_is_not_resolvable() {
        for document_type in DocumentType::all() {
            let name = Some(document_type.as_str());
            assert_eq!(resolve_href(name, None), None);
            assert_eq!(resolve_href(name, Some("")), None);
            assert_eq!(resolve_href(name, Some("   ")), None);
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let first = resolve_href(Some("post"), Some("same-slug"));
        let second = resolve_href(Some("post"), Some("same-slug"));
        assert_eq!(first, second);
    }

    #[test]
    fn slug_is_encoded_as_a_single_segment() {
        assert_eq!(
            resolve_href(Some("post"), Some("a/b c")).as_deref(),
            Some("/blog/a%2Fb%20c")
        );
    }

    #[test]
    fn document_type_round_trips_through_str() {
        for document_type in DocumentType::all() {
            assert_eq!(
                document_type.as_str().parse::<DocumentType>(),
                Ok(*document_type)
            );
        }
        assert!("home".parse::<DocumentType>().is_err());
    }
}
