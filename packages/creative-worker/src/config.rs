use anyhow::{bail, Context, Result};
use creative_extraction::{ImageEndpoint, SecretString};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_keys: Vec<SecretString>,
    pub image_endpoints: Vec<ImageEndpoint>,
    pub search_url: Option<String>,
    pub search_api_key: Option<SecretString>,
    pub image_index: String,
    pub video_index: String,
    pub key_threshold: u32,
    pub key_cooldown: Duration,
    pub flush_every_ads: usize,
    pub batch_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            gemini_api_keys: parse_keys(
                &env::var("GEMINI_API_KEYS").context("GEMINI_API_KEYS must be set")?,
            )?,
            image_endpoints: parse_endpoints(
                &env::var("IMAGE_ENDPOINTS").context("IMAGE_ENDPOINTS must be set")?,
            )?,
            search_url: env::var("SEARCH_URL").ok().filter(|url| !url.is_empty()),
            search_api_key: env::var("SEARCH_API_KEY")
                .ok()
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
            image_index: env::var("IMAGE_INDEX")
                .unwrap_or_else(|_| "image_competitors_analysis".to_string()),
            video_index: env::var("VIDEO_INDEX")
                .unwrap_or_else(|_| "video_competitors_analysis".to_string()),
            key_threshold: number_or("KEY_THRESHOLD", 15)?,
            key_cooldown: Duration::from_secs(number_or("KEY_COOLDOWN_SECS", 60)?),
            flush_every_ads: number_or("FLUSH_EVERY_ADS", 5)?,
            batch_capacity: number_or("BATCH_CAPACITY", 100)?,
        })
    }
}

fn number_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}

/// Comma-separated provider keys.
fn parse_keys(raw: &str) -> Result<Vec<SecretString>> {
    let keys: Vec<SecretString> = raw
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(SecretString::from)
        .collect();
    if keys.is_empty() {
        bail!("GEMINI_API_KEYS must contain at least one key");
    }
    Ok(keys)
}

/// `name|url|key` entries separated by `;`.
fn parse_endpoints(raw: &str) -> Result<Vec<ImageEndpoint>> {
    let mut endpoints = Vec::new();
    for (position, entry) in raw.split(';').enumerate() {
        if entry.trim().is_empty() {
            continue;
        }
        let endpoint = ImageEndpoint::parse(entry)
            .with_context(|| format!("IMAGE_ENDPOINTS entry {position} must be name|url|key"))?;
        endpoints.push(endpoint);
    }
    if endpoints.is_empty() {
        bail!("IMAGE_ENDPOINTS must contain at least one endpoint");
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        let keys = parse_keys(" a , b,,c ").unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[1].expose(), "b");
        assert!(parse_keys(" , ").is_err());
    }

    #[test]
    fn test_parse_endpoints() {
        let endpoints =
            parse_endpoints("east|https://east.example.com/chat|k1; west|https://west.example.com/chat|k2;")
                .unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[1].name, "west");
        assert_eq!(endpoints[1].api_key.expose(), "k2");

        assert!(parse_endpoints("east|https://east.example.com/chat").is_err());
        assert!(parse_endpoints("").is_err());
    }
}
