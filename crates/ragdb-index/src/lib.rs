//! Exact similarity index over chunk embeddings.
//!
//! [`FlatIpIndex`] is the dense inner-product matrix; [`VectorStore`] pairs
//! it with the chunk records, score filtering, relevance banding, and the
//! two-artifact persistence format.

pub mod flat;
pub mod store;

pub use flat::FlatIpIndex;
pub use store::{IndexState, VectorStore};
