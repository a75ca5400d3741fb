use crate::error::EmbeddingError;

/// The embedding capability consumed by the index and pipeline.
///
/// Implementations live in `ragdb-embed`; everything else treats this as an
/// opaque `text -> fixed-length vector` function.
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;

    /// Embed a single non-empty text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts. Blank entries are dropped; the output keeps
    /// the order of the surviving inputs. Fails if nothing valid remains.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
