//! Dispatch by media type.

use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::traits::extraction::ExtractionClient;
use crate::types::brand::BrandProfile;
use crate::types::creative::{Creative, MediaType};
use crate::types::record::ExtractedRecord;

/// Holds one extraction client per media type.
#[derive(Clone)]
pub struct ExtractionRouter {
    image: Arc<dyn ExtractionClient>,
    video: Arc<dyn ExtractionClient>,
}

impl ExtractionRouter {
    /// Fails if a client is registered for a media type it does not handle.
    pub fn new(image: Arc<dyn ExtractionClient>, video: Arc<dyn ExtractionClient>) -> Result<Self> {
        for (expected, client) in [(MediaType::Image, &image), (MediaType::Video, &video)] {
            if client.capability() != expected {
                return Err(PipelineError::Config(format!(
                    "{} client registered for {} creatives",
                    client.capability(),
                    expected
                )));
            }
        }
        Ok(Self { image, video })
    }

    pub fn client_for(&self, media_type: MediaType) -> &dyn ExtractionClient {
        match media_type {
            MediaType::Image => self.image.as_ref(),
            MediaType::Video => self.video.as_ref(),
        }
    }

    pub async fn extract(&self, creative: &Creative, brand: &BrandProfile) -> Option<ExtractedRecord> {
        self.client_for(creative.media_type).extract(creative, brand).await
    }
}
