//! Video extraction over the Gemini Files + generateContent APIs.
//!
//! One attempt downloads the asset, uploads it, polls until the provider has
//! processed it, then requests structured output. Upload and generate each
//! spend one use of the current credential once the call has been made; a
//! credential that reaches its threshold is swapped for a fresh one before
//! the next call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{FetchError, ProviderError, ProviderResult};
use crate::providers::backoff::{Backoff, RetryStep};
use crate::providers::prompt::BrandContextPrompt;
use crate::providers::schema::video_response_schema;
use crate::rotator::{Credential, KeyRotator};
use crate::traits::extraction::{ExtractionClient, PromptBuilder};
use crate::types::brand::BrandProfile;
use crate::types::creative::{Creative, MediaType};
use crate::types::record::ExtractedRecord;

const DEFAULT_MIME: &str = "video/mp4";

/// Video client settings.
#[derive(Debug, Clone)]
pub struct VideoClientConfig {
    /// Default: 3 attempts, 60s base delay, up to 10% jitter.
    pub backoff: Backoff,

    /// API root. Default: `https://generativelanguage.googleapis.com`.
    pub base_url: String,

    /// Model resource name. Default: `models/gemini-1.5-pro-latest`.
    pub model: String,

    /// Deadline for downloading the source asset. Default: 60 seconds.
    pub download_timeout: Duration,

    /// Deadline for the generate call. Default: 200 seconds.
    pub generate_timeout: Duration,

    /// Delay between file state polls. Default: 5 seconds.
    pub poll_interval: Duration,

    /// Longest wait for the uploaded file to become active. Default: 300 seconds.
    pub max_processing_wait: Duration,
}

impl Default for VideoClientConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::new(3, Duration::from_secs(60)).with_jitter(0.1),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "models/gemini-1.5-pro-latest".to_string(),
            download_timeout: Duration::from_secs(60),
            generate_timeout: Duration::from_secs(200),
            poll_interval: Duration::from_secs(5),
            max_processing_wait: Duration::from_secs(300),
        }
    }
}

impl VideoClientConfig {
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_poll(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_processing_wait = max_wait;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiFile {
    name: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: GeminiFile,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
struct FileData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    #[serde(rename = "fileUri")]
    file_uri: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig<'a> {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    #[serde(rename = "responseSchema")]
    response_schema: &'a Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Downloaded asset bytes and their content type.
struct Asset {
    bytes: Vec<u8>,
    mime_type: String,
}

/// Extraction client for video creatives.
pub struct VideoExtractionClient {
    client: reqwest::Client,
    rotator: Arc<KeyRotator>,
    prompts: Arc<dyn PromptBuilder>,
    schema: Value,
    config: VideoClientConfig,
}

impl VideoExtractionClient {
    pub fn new(rotator: Arc<KeyRotator>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rotator,
            prompts: Arc::new(BrandContextPrompt),
            schema: video_response_schema(),
            config: VideoClientConfig::default(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_config(mut self, config: VideoClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Record a call made with `credential`, replacing it with a fresh one
    /// when that call reached the threshold.
    async fn spend(&self, credential: &mut Credential) {
        if self.rotator.mark_used(credential).await {
            debug!(credential = %credential.id(), "credential exhausted, switching before next call");
            *credential = self.rotator.acquire().await;
        }
    }

    async fn attempt(&self, creative: &Creative, prompt: &str) -> ProviderResult<ExtractedRecord> {
        let mut credential = self.rotator.acquire().await;
        debug!(url = %creative.url, credential = %credential.id(), "video attempt starting");

        let asset = self.download(&creative.url).await?;

        let uploaded = self.upload(&credential, asset).await;
        self.spend(&mut credential).await;
        let file = self.wait_until_active(&credential, uploaded?).await?;

        let generated = self.generate(&credential, &file, prompt).await;
        // Last call of the attempt; the next acquire picks up any cooldown
        self.rotator.mark_used(&credential).await;
        generated
    }

    async fn download(&self, url: &str) -> ProviderResult<Asset> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or(DEFAULT_MIME)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        debug!(url = %url, bytes = bytes.len(), mime_type = %mime_type, "video downloaded");
        Ok(Asset {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }

    async fn upload(&self, credential: &Credential, asset: Asset) -> ProviderResult<GeminiFile> {
        let url = format!("{}/upload/v1beta/files", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.secret().expose())
            .header("X-Goog-Upload-Protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, asset.mime_type)
            .timeout(self.config.download_timeout)
            .body(asset.bytes)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.download_timeout))?;

        let response = check_status(response, "upload").await?;
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        debug!(file = %uploaded.file.name, "video uploaded");
        Ok(uploaded.file)
    }

    async fn wait_until_active(
        &self,
        credential: &Credential,
        mut file: GeminiFile,
    ) -> ProviderResult<GeminiFile> {
        let deadline = Instant::now() + self.config.max_processing_wait;

        loop {
            match file.state.as_deref() {
                Some("ACTIVE") => return Ok(file),
                Some("FAILED") => {
                    return Err(ProviderError::Processing(format!(
                        "file {} failed processing",
                        file.name
                    )))
                }
                _ => {}
            }

            if Instant::now() + self.config.poll_interval > deadline {
                return Err(ProviderError::Processing(format!(
                    "file {} not active after {:?}",
                    file.name, self.config.max_processing_wait
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;

            let url = format!("{}/v1beta/{}", self.config.base_url, file.name);
            let response = self
                .client
                .get(&url)
                .header("x-goog-api-key", credential.secret().expose())
                .timeout(self.config.download_timeout)
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(e, self.config.download_timeout))?;
            let response = check_status(response, "files.get").await?;
            file = response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()))?;
            debug!(file = %file.name, state = ?file.state, "polled file state");
        }
    }

    async fn generate(
        &self,
        credential: &Credential,
        file: &GeminiFile,
        prompt: &str,
    ) -> ProviderResult<ExtractedRecord> {
        let file_uri = file
            .uri
            .as_deref()
            .ok_or_else(|| ProviderError::Malformed(format!("file {} has no uri", file.name)))?;
        let mime_type = file.mime_type.as_deref().unwrap_or(DEFAULT_MIME);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::File {
                        file_data: FileData {
                            mime_type,
                            file_uri,
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: &self.schema,
            },
        };

        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.secret().expose())
            .timeout(self.config.generate_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.generate_timeout))?;

        let response = check_status(response, "generateContent").await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        ExtractedRecord::parse(&text)
    }
}

async fn check_status(response: reqwest::Response, call: &str) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited {
            endpoint: call.to_string(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            endpoint: call.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl ExtractionClient for VideoExtractionClient {
    fn capability(&self) -> MediaType {
        MediaType::Video
    }

    async fn extract(&self, creative: &Creative, brand: &BrandProfile) -> Option<ExtractedRecord> {
        let prompt = self.prompts.build(creative, brand);
        let backoff = &self.config.backoff;
        let mut retry = backoff.start();

        loop {
            let error = match self.attempt(creative, &prompt).await {
                Ok(record) => {
                    info!(url = %creative.url, attempt = retry.display_attempt(), "video extracted");
                    return Some(record);
                }
                Err(e) => e,
            };

            warn!(
                url = %creative.url,
                attempt = retry.display_attempt(),
                max_attempts = retry.max_attempts(),
                error = %error,
                "video attempt failed"
            );

            match retry.on_failure(backoff) {
                RetryStep::Retry { delay, .. } => {
                    tokio::time::sleep(delay).await;
                }
                RetryStep::Exhausted => {
                    warn!(url = %creative.url, "video extraction exhausted all attempts");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_shape() {
        let schema = serde_json::json!({"type": "OBJECT"});
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::File {
                        file_data: FileData {
                            mime_type: "video/mp4",
                            file_uri: "https://files.example.com/abc",
                        },
                    },
                    Part::Text { text: "analyse" },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: &schema,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["fileData"]["fileUri"], "https://files.example.com/abc");
        assert_eq!(parts[1]["text"], "analyse");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn test_default_config() {
        let config = VideoClientConfig::default();
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.backoff.base_delay, Duration::from_secs(60));
        assert_eq!(config.max_processing_wait, Duration::from_secs(300));
        assert_eq!(config.generate_timeout, Duration::from_secs(200));
    }
}
