//! Core trait abstractions for the creative pipeline.
//!
//! Applications plug in hashing, extraction providers, storage and search
//! backends through these traits; `stores`, `search` and `testing` ship
//! implementations.

pub mod extraction;
pub mod hasher;
pub mod resource;
pub mod search;
pub mod store;
