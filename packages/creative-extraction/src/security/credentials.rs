//! Credential handling with secure memory.
//!
//! Provider keys are wrapped in `secrecy` so they never reach logs, debug
//! output, or error messages.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value. Only call this when building a request.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One image-analysis deployment: a name for logs, the completions URL, and
/// the key sent in the `api-key` header.
#[derive(Clone)]
pub struct ImageEndpoint {
    pub name: String,
    pub url: String,
    pub api_key: SecretString,
}

impl ImageEndpoint {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: SecretString::new(api_key),
        }
    }

    /// Parse a `name|url|key` triple.
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.trim().splitn(3, '|');
        let name = parts.next()?.trim();
        let url = parts.next()?.trim();
        let key = parts.next()?.trim();
        if name.is_empty() || url.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(name, url, key))
    }
}

impl fmt::Debug for ImageEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageEndpoint")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_not_in_debug() {
        let secret = SecretString::new("AIza-super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("AIza"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_secret_not_in_display() {
        let secret = SecretString::new("AIza-super-secret");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "AIza-super-secret");
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = ImageEndpoint::parse(" east | https://east.example.com/chat | k1 ").unwrap();
        assert_eq!(endpoint.name, "east");
        assert_eq!(endpoint.url, "https://east.example.com/chat");
        assert_eq!(endpoint.api_key.expose(), "k1");

        assert!(ImageEndpoint::parse("east|https://east.example.com").is_none());
        assert!(ImageEndpoint::parse("east||k1").is_none());
    }

    #[test]
    fn test_endpoint_debug_redacts_key() {
        let endpoint = ImageEndpoint::new("west", "https://west.example.com", "secret-key");
        let debug = format!("{:?}", endpoint);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("west"));
    }
}
