//! Extraction provider clients.
//!
//! - [`ImageExtractionClient`]: chat-completions endpoints with failover
//! - [`VideoExtractionClient`]: upload, poll and generate with rotated keys
//! - [`ExtractionRouter`]: picks the client for a creative's media type

pub mod backoff;
pub mod image;
pub mod prompt;
pub mod router;
pub mod schema;
pub mod video;

pub use backoff::{Backoff, RetryState, RetryStep};
pub use image::{ImageClientConfig, ImageExtractionClient};
pub use prompt::BrandContextPrompt;
pub use router::ExtractionRouter;
pub use video::{VideoClientConfig, VideoExtractionClient};
