//! Hybrid retrieval engine: sparse lexical + dense semantic, fused by
//! weighted reciprocal-rank fusion.

pub mod hybrid;
pub mod lexical;
pub mod semantic;

pub use hybrid::{FusedHit, HybridRetriever};
pub use lexical::LexicalIndex;
pub use semantic::{EmbeddingFn, HashingEmbedder, SemanticIndex, EMBEDDING_DIM};
