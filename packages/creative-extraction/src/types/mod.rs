//! Data types for the creative extraction pipeline.

pub mod ad;
pub mod brand;
pub mod config;
pub mod creative;
pub mod document;
pub mod job;
pub mod record;
