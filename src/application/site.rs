//! Public site pages, read through a per-request content client.

use axum::http::StatusCode;
use time::{
    OffsetDateTime,
    format_description::{FormatItem, well_known::Rfc3339},
    macros::format_description,
};

use crate::application::error::HttpError;
use crate::domain::{
    documents::{
        CategoryPayload, DocumentRef, HomePagePayload, PagePayload, PostPayload, plain_paragraphs,
    },
    links::DocumentType,
    queries::ContentQuery,
};
use crate::presentation::views::{
    BlogView, CategoryLink, CategoryView, HomeView, PageView, PostCard, PostView,
};

use super::content::{ContentClientSelector, ContentError, PreviewOptions};
use super::repos::RepoError;

const SOURCE: &str = "application::site::SiteService";
const UNTITLED: &str = "Untitled";
const DEFAULT_HOME_TITLE: &str = "Home";
const HOME_POST_LIMIT: usize = 5;

const DISPLAY_DATE: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");
const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Clone)]
pub struct SiteService {
    selector: ContentClientSelector,
}

impl SiteService {
    pub fn new(selector: ContentClientSelector) -> Self {
        Self { selector }
    }

    /// Options for a request, given whether it carries a preview session.
    pub fn preview_options(&self, session_active: bool) -> Option<PreviewOptions> {
        PreviewOptions::from_session(session_active, self.selector.read_token())
    }

    pub async fn home(&self, preview: Option<&PreviewOptions>) -> Result<HomeView, HttpError> {
        let client = self.selector.client(preview);
        let (home, posts) = tokio::try_join!(
            client.fetch::<HomePagePayload>(&ContentQuery::HomePage),
            client.fetch_list::<PostPayload>(&ContentQuery::BlogPosts),
        )
        .map_err(|err| content_failure("home", err))?;

        let home = home.unwrap_or_default();
        Ok(HomeView {
            title: home
                .title
                .unwrap_or_else(|| DEFAULT_HOME_TITLE.to_string()),
            overview: plain_paragraphs(home.overview.as_ref()),
            posts: posts
                .iter()
                .filter_map(post_card)
                .take(HOME_POST_LIMIT)
                .collect(),
        })
    }

    pub async fn blog(&self, preview: Option<&PreviewOptions>) -> Result<BlogView, HttpError> {
        let client = self.selector.client(preview);
        let (posts, categories) = tokio::try_join!(
            client.fetch_list::<PostPayload>(&ContentQuery::BlogPosts),
            client.fetch_list::<CategoryPayload>(&ContentQuery::Categories),
        )
        .map_err(|err| content_failure("blog", err))?;

        Ok(BlogView {
            posts: posts.iter().filter_map(post_card).collect(),
            categories: categories.iter().filter_map(category_link).collect(),
        })
    }

    pub async fn post(
        &self,
        slug: &str,
        preview: Option<&PreviewOptions>,
    ) -> Result<Option<PostView>, HttpError> {
        let post = self
            .selector
            .client(preview)
            .fetch::<PostPayload>(&ContentQuery::PostBySlug(slug.to_string()))
            .await
            .map_err(|err| content_failure("post", err))?;

        Ok(post.map(|post| {
            let (published, iso_date) = published_dates(post.published_at.as_deref());
            PostView {
                title: post.title.unwrap_or_else(|| UNTITLED.to_string()),
                excerpt: post.excerpt,
                published,
                iso_date,
                paragraphs: plain_paragraphs(post.body.as_ref()),
            }
        }))
    }

    pub async fn category(
        &self,
        slug: &str,
        preview: Option<&PreviewOptions>,
    ) -> Result<Option<CategoryView>, HttpError> {
        let client = self.selector.client(preview);
        let category = client
            .fetch::<CategoryPayload>(&ContentQuery::CategoryBySlug(slug.to_string()))
            .await
            .map_err(|err| content_failure("category", err))?;

        let Some(category) = category else {
            return Ok(None);
        };

        let posts = client
            .fetch_list::<PostPayload>(&ContentQuery::PostsInCategory(category.id.clone()))
            .await
            .map_err(|err| content_failure("category_posts", err))?;

        Ok(Some(CategoryView {
            title: category.title.unwrap_or_else(|| UNTITLED.to_string()),
            description: category.description,
            posts: posts.iter().filter_map(post_card).collect(),
        }))
    }

    pub async fn page(
        &self,
        slug: &str,
        preview: Option<&PreviewOptions>,
    ) -> Result<Option<PageView>, HttpError> {
        let page = self
            .selector
            .client(preview)
            .fetch::<PagePayload>(&ContentQuery::PageBySlug(slug.to_string()))
            .await
            .map_err(|err| content_failure("page", err))?;

        Ok(page.map(|page| PageView {
            title: page.title.unwrap_or_else(|| UNTITLED.to_string()),
            overview: plain_paragraphs(page.overview.as_ref()),
            paragraphs: plain_paragraphs(page.body.as_ref()),
        }))
    }
}

fn post_card(post: &PostPayload) -> Option<PostCard> {
    let slug = post.slug.as_ref()?;
    let href = DocumentRef::new(DocumentType::Post.as_str(), slug.as_str()).href()?;
    let (published, iso_date) = published_dates(post.published_at.as_deref());
    Some(PostCard {
        title: post.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
        href,
        excerpt: post.excerpt.clone(),
        published,
        iso_date,
    })
}

fn category_link(category: &CategoryPayload) -> Option<CategoryLink> {
    let slug = category.slug.as_ref()?;
    let href = DocumentRef::new(DocumentType::Category.as_str(), slug.as_str()).href()?;
    Some(CategoryLink {
        title: category
            .title
            .clone()
            .unwrap_or_else(|| UNTITLED.to_string()),
        href,
    })
}

fn published_dates(raw: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(timestamp) = raw.and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok()) else {
        return (None, None);
    };
    (
        timestamp.format(DISPLAY_DATE).ok(),
        timestamp.format(ISO_DATE).ok(),
    )
}

fn content_failure(operation: &'static str, err: ContentError) -> HttpError {
    let (status, public_message) = match &err {
        ContentError::Repo(RepoError::Unavailable { .. } | RepoError::Timeout) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Content temporarily unavailable",
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load page content",
        ),
    };
    HttpError::new(SOURCE, status, public_message, format!("{operation} failed: {err}"))
}
