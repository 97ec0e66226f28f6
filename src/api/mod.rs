//! Ingestion and acknowledgment HTTP surface.
//!
//! Thin boundary over the engine: format normalization, auth, and channel
//! inbound parsing (SMS replies, app buttons) all live upstream of this API.

pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::build_router;
