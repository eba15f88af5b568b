use crate::application::error::{ErrorReport, HttpError};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Target of the "Exit preview" link shown in preview mode.
pub const EXIT_PREVIEW_HREF: &str = "/api/disable-preview";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Per-request page chrome.
#[derive(Clone)]
pub struct LayoutChrome {
    pub site_title: String,
    /// Shows the preview banner with its exit link.
    pub preview: bool,
}

impl LayoutChrome {
    pub fn new(site_title: impl Into<String>, preview: bool) -> Self {
        Self {
            site_title: site_title.into(),
            preview,
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub site_title: String,
    pub preview: bool,
    pub exit_preview_href: &'static str,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            site_title: chrome.site_title,
            preview: chrome.preview,
            exit_preview_href: EXIT_PREVIEW_HREF,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    pub title: String,
    pub href: String,
    pub excerpt: Option<String>,
    pub published: Option<String>,
    pub iso_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub title: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct HomeView {
    pub title: String,
    pub overview: Vec<String>,
    pub posts: Vec<PostCard>,
}

#[derive(Debug, Clone)]
pub struct BlogView {
    pub posts: Vec<PostCard>,
    pub categories: Vec<CategoryLink>,
}

#[derive(Debug, Clone)]
pub struct PostView {
    pub title: String,
    pub excerpt: Option<String>,
    pub published: Option<String>,
    pub iso_date: Option<String>,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryView {
    pub title: String,
    pub description: Option<String>,
    pub posts: Vec<PostCard>,
}

#[derive(Debug, Clone)]
pub struct PageView {
    pub title: String,
    pub overview: Vec<String>,
    pub paragraphs: Vec<String>,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub view: LayoutContext<HomeView>,
}

#[derive(Template)]
#[template(path = "blog.html")]
pub struct BlogTemplate {
    pub view: LayoutContext<BlogView>,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostView>,
}

#[derive(Template)]
#[template(path = "category.html")]
pub struct CategoryTemplate {
    pub view: LayoutContext<CategoryView>,
}

#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate {
    pub view: LayoutContext<PageView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            title: "Something went wrong".to_string(),
            message: message.into(),
            primary_action: Some(ErrorAction::home()),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chrome(preview: bool) -> LayoutChrome {
        LayoutChrome::new("Vetrina", preview)
    }

    #[test]
    fn preview_banner_renders_only_in_preview_mode() {
        let view = PageView {
            title: "About".to_string(),
            overview: vec![],
            paragraphs: vec!["Hello".to_string()],
        };
        let published = PageTemplate {
            view: LayoutContext::new(chrome(false), view.clone()),
        }
        .render()
        .expect("render");
        assert!(!published.contains(EXIT_PREVIEW_HREF));

        let preview = PageTemplate {
            view: LayoutContext::new(chrome(true), view),
        }
        .render()
        .expect("render");
        assert!(preview.contains(EXIT_PREVIEW_HREF));
        assert!(preview.contains("Hello"));
    }

    #[test]
    fn post_cards_link_to_their_href() {
        let view = BlogView {
            posts: vec![PostCard {
                title: "Hello <World>".to_string(),
                href: "/blog/hello-world".to_string(),
                excerpt: None,
                published: Some("March 4, 2026".to_string()),
                iso_date: Some("2026-03-04".to_string()),
            }],
            categories: vec![CategoryLink {
                title: "News".to_string(),
                href: "/blog/category/news".to_string(),
            }],
        };
        let html = BlogTemplate {
            view: LayoutContext::new(chrome(false), view),
        }
        .render()
        .expect("render");
        assert!(html.contains("href=\"/blog/hello-world\""));
        assert!(html.contains("Hello "));
        assert!(!html.contains("<World>"));
        assert!(html.contains("datetime=\"2026-03-04\""));
        assert!(html.contains("/blog/category/news"));
    }

    #[test]
    fn not_found_response_carries_report() {
        let response = render_not_found_response(chrome(false));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
