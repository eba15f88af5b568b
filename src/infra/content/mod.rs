//! Content backend adapters.

mod http;
mod memory;

pub use http::{HttpBackendConfig, HttpContentBackend};
pub use memory::MemoryContentBackend;
