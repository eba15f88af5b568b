//! Studio-side preview pane markup.

use askama::Template;

use crate::application::preview_pane::PaneView;

/// Datastar client bundle loaded by the pane shell.
pub const DATASTAR_SRC: &str =
    "https://cdn.jsdelivr.net/gh/starfederation/datastar@1.0.0-RC.6/bundles/datastar.js";

/// Element id patched by the frame endpoint.
pub const FRAME_SELECTOR: &str = "#preview-frame";

const FRAME_PATH: &str = "/preview-pane/frame";

#[derive(Template)]
#[template(path = "studio/preview_pane.html")]
pub struct PreviewPaneTemplate {
    pub datastar_src: &'static str,
    pub notice: Option<&'static str>,
    pub href: String,
    pub frame_url: String,
}

impl From<PaneView> for PreviewPaneTemplate {
    fn from(view: PaneView) -> Self {
        match view {
            PaneView::Notice { message } => Self {
                datastar_src: DATASTAR_SRC,
                notice: Some(message),
                href: String::new(),
                frame_url: String::new(),
            },
            PaneView::Frame { href, frame_query } => Self {
                datastar_src: DATASTAR_SRC,
                notice: None,
                href,
                frame_url: frame_url(&frame_query),
            },
        }
    }
}

#[derive(Template)]
#[template(path = "studio/partials/pane_frame.html")]
pub struct PaneFrameTemplate {
    pub src: String,
    pub href: String,
}

#[derive(Template)]
#[template(path = "studio/partials/pane_error.html")]
pub struct PaneErrorTemplate {
    pub message: String,
    pub frame_url: String,
}

/// Frame endpoint URL for the given document query string.
pub fn frame_url(frame_query: &str) -> String {
    if frame_query.is_empty() {
        FRAME_PATH.to_string()
    } else {
        format!("{FRAME_PATH}?{frame_query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::preview_pane::PANE_NOTICE;

    #[test]
    fn notice_view_renders_without_a_frame() {
        let html = PreviewPaneTemplate::from(PaneView::Notice {
            message: PANE_NOTICE,
        })
        .render()
        .expect("render");
        assert!(html.contains("Please add a slug to the post to see the preview!"));
        assert!(!html.contains("preview-frame"));
    }

    #[test]
    fn frame_view_requests_the_frame_endpoint() {
        let html = PreviewPaneTemplate::from(PaneView::Frame {
            href: "/blog/hello-world".to_string(),
            frame_query: "documentType=post&slug=hello-world".to_string(),
        })
        .render()
        .expect("render");
        assert!(html.contains("id=\"preview-frame\""));
        assert!(html.contains("data-init"));
        assert!(html.contains("/preview-pane/frame?documentType=post"));
    }

    #[test]
    fn frame_url_omits_empty_query() {
        assert_eq!(frame_url(""), "/preview-pane/frame");
        assert_eq!(frame_url("slug=a"), "/preview-pane/frame?slug=a");
    }
}
