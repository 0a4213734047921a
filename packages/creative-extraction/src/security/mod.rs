//! Credential handling.

pub mod credentials;

pub use credentials::{ImageEndpoint, SecretString};
