//! Domain layer types and invariants.

pub mod documents;
pub mod error;
pub mod links;
pub mod preview_secret;
pub mod queries;
