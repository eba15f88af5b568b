//! Application services orchestrating domain logic and content backends.

pub mod content;
pub mod error;
pub mod preview;
pub mod preview_pane;
pub mod preview_secret;
pub mod repos;
pub mod site;
pub mod stream;
