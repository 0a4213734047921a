//! Image extraction over chat-completions endpoints.
//!
//! Endpoints are tried in round-robin order within an attempt; any failure
//! (429, other status, missing choices, empty or unparseable content, timeout)
//! moves to the next endpoint. Once every endpoint has failed, the attempt
//! counts as failed and the client backs off before starting over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::providers::backoff::{Backoff, RetryStep};
use crate::providers::prompt::BrandContextPrompt;
use crate::security::ImageEndpoint;
use crate::traits::extraction::{ExtractionClient, PromptBuilder};
use crate::types::brand::BrandProfile;
use crate::types::creative::{Creative, MediaType};
use crate::types::record::ExtractedRecord;

const SYSTEM_PROMPT: &str =
    "You are a creative analysis assistant that extracts entities from images and returns JSON.";

/// Image client settings.
#[derive(Debug, Clone)]
pub struct ImageClientConfig {
    /// Default: 3 attempts, 2.5s base delay, no jitter.
    pub backoff: Backoff,

    /// Per-request deadline. Default: 300 seconds.
    pub request_timeout: Duration,

    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ImageClientConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::new(3, Duration::from_millis(2500)),
            request_timeout: Duration::from_secs(300),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

impl ImageClientConfig {
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extraction client for image creatives.
pub struct ImageExtractionClient {
    client: reqwest::Client,
    endpoints: Vec<ImageEndpoint>,
    prompts: Arc<dyn PromptBuilder>,
    config: ImageClientConfig,
    failovers: AtomicU64,
}

impl ImageExtractionClient {
    pub fn new(endpoints: Vec<ImageEndpoint>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            prompts: Arc::new(BrandContextPrompt),
            config: ImageClientConfig::default(),
            failovers: AtomicU64::new(0),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_config(mut self, config: ImageClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Number of endpoint-to-endpoint switches after a failure since creation.
    pub fn failover_count(&self) -> u64 {
        self.failovers.load(Ordering::Relaxed)
    }

    async fn call_endpoint(
        &self,
        endpoint: &ImageEndpoint,
        image_url: &str,
        prompt: &str,
    ) -> ProviderResult<ExtractedRecord> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text { text: prompt },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: image_url },
                        },
                    ]),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(&endpoint.url)
            .header("api-key", endpoint.api_key.expose())
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.request_timeout))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                endpoint: endpoint.name.clone(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                endpoint: endpoint.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no choices".into()))?
            .message
            .content
            .unwrap_or_default();

        ExtractedRecord::parse(&content)
    }
}

#[async_trait]
impl ExtractionClient for ImageExtractionClient {
    fn capability(&self) -> MediaType {
        MediaType::Image
    }

    async fn extract(&self, creative: &Creative, brand: &BrandProfile) -> Option<ExtractedRecord> {
        let endpoint_count = self.endpoints.len();
        if endpoint_count == 0 {
            warn!(url = %creative.url, "no image endpoints configured");
            return None;
        }

        let prompt = self.prompts.build(creative, brand);
        let backoff = &self.config.backoff;
        let mut retry = backoff.start();

        loop {
            let start = retry.attempt() as usize % endpoint_count;

            for offset in 0..endpoint_count {
                let endpoint = &self.endpoints[(start + offset) % endpoint_count];
                debug!(
                    url = %creative.url,
                    endpoint = %endpoint.name,
                    attempt = retry.display_attempt(),
                    max_attempts = retry.max_attempts(),
                    "calling image endpoint"
                );

                match self.call_endpoint(endpoint, &creative.url, &prompt).await {
                    Ok(record) => {
                        info!(url = %creative.url, endpoint = %endpoint.name, "image extracted");
                        return Some(record);
                    }
                    Err(e) => {
                        warn!(
                            url = %creative.url,
                            endpoint = %endpoint.name,
                            error = %e,
                            "image endpoint failed"
                        );
                        if offset + 1 < endpoint_count {
                            self.failovers.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }

            match retry.on_failure(backoff) {
                RetryStep::Retry { attempt, delay } => {
                    warn!(
                        url = %creative.url,
                        next_attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "all image endpoints failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryStep::Exhausted => {
                    warn!(url = %creative.url, "image extraction exhausted all attempts");
                    return None;
                }
            }
        }
    }
}
