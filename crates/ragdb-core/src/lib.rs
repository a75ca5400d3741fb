//! Core domain types and services for the ragdb retrieval engine.
//!
//! This crate owns the shared vocabulary (chunks, search results, relevance
//! bands), the per-concern error enums, the figment-backed configuration, the
//! `Embedder` capability trait, and the two ingestion-side services that do
//! not depend on a model or an index: the chunker and the document loader.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
