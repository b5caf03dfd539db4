//! Dense-embedding ranker backed by an approximate-NN index.
//!
//! Below `ANN_THRESHOLD` documents, brute-force inner product is fast
//! enough and the HNSW (`instant-distance`) build is skipped entirely.

use instant_distance::{Builder, HnswMap, Point, Search};
use serde::{Deserialize, Serialize};

use crate::data::{Document, RetrievalHit};

/// Fixed embedding dimension.
pub const EMBEDDING_DIM: usize = 384;

const ANN_THRESHOLD: usize = 1000;

/// Pluggable embedding backend. The core does not ship a real ML
/// model; callers supply one. The contract: fixed dimension, deterministic,
/// L2-normalized output.
pub trait EmbeddingFn: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Deterministic stand-in embedder: hashes token shingles into a fixed
/// `EMBEDDING_DIM`-wide vector, then L2-normalizes. Not semantically
/// meaningful, but satisfies every invariant `SemanticIndex` needs
/// (fixed dim, deterministic, normalized) for tests and for running
/// without a real model wired up.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl EmbeddingFn for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; EMBEDDING_DIM];
        for tok in super::lexical::tokenize(text) {
            let hash = blake3::hash(tok.as_bytes());
            let bytes = hash.as_bytes();
            for (i, chunk) in bytes.chunks(4).enumerate() {
                let idx = (i * 7 + usize::from(chunk[0])) % EMBEDDING_DIM;
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let val = i32::from_le_bytes(buf) as f32 / i32::MAX as f32;
                v[idx] += val;
            }
        }
        l2_normalize(&mut v);
        v
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EmbeddingPoint {
    values: Vec<f32>,
}

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        // instant-distance minimizes distance; invert inner product
        // (higher similarity => lower distance) since vectors are
        // L2-normalized, inner product == cosine similarity.
        1.0 - inner_product(&self.values, &other.values)
    }
}

/// Serialized artifact: document id -> embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingRecord {
    document_id: String,
    vector: Vec<f32>,
}

fn build_ann(embeddings: &[EmbeddingRecord]) -> Option<HnswMap<EmbeddingPoint, usize>> {
    if embeddings.len() < ANN_THRESHOLD {
        return None;
    }
    let (points, keys): (Vec<EmbeddingPoint>, Vec<usize>) = embeddings
        .iter()
        .enumerate()
        .map(|(i, e)| (EmbeddingPoint { values: e.vector.clone() }, i))
        .unzip();
    Some(Builder::default().build(points, keys))
}

/// Dense ranker over L2-normalized embeddings.
pub struct SemanticIndex {
    docs: Vec<Document>,
    embeddings: Vec<EmbeddingRecord>,
    ann: Option<HnswMap<EmbeddingPoint, usize>>,
}

impl SemanticIndex {
    pub fn empty() -> Self {
        Self {
            docs: Vec::new(),
            embeddings: Vec::new(),
            ann: None,
        }
    }

    pub fn build(docs: Vec<Document>, embedder: &dyn EmbeddingFn) -> Self {
        let embeddings: Vec<EmbeddingRecord> = docs
            .iter()
            .map(|d| {
                let mut vector = embedder.embed(&format!("{} {}", d.title, d.body));
                l2_normalize(&mut vector);
                EmbeddingRecord {
                    document_id: d.id.clone(),
                    vector,
                }
            })
            .collect();

        let ann = build_ann(&embeddings);

        Self { docs, embeddings, ann }
    }

    /// Writes the two paired artifacts a deployment persists for this
    /// index: a metadata file (documents) and a dense-vector
    /// file (normalized embeddings). The HNSW graph itself is not
    /// serialized; `load` rebuilds it from the vectors.
    pub fn save(&self, metadata_path: &std::path::Path, vectors_path: &std::path::Path) -> crate::error::Result<()> {
        let meta_file = std::fs::File::create(metadata_path)?;
        serde_json::to_writer(meta_file, &self.docs)?;
        let vectors_file = std::fs::File::create(vectors_path)?;
        serde_json::to_writer(vectors_file, &self.embeddings)?;
        Ok(())
    }

    pub fn load(metadata_path: &std::path::Path, vectors_path: &std::path::Path) -> crate::error::Result<Self> {
        let docs: Vec<Document> = serde_json::from_reader(std::fs::File::open(metadata_path)?)?;
        let embeddings: Vec<EmbeddingRecord> = serde_json::from_reader(std::fs::File::open(vectors_path)?)?;
        let ann = build_ann(&embeddings);
        Ok(Self { docs, embeddings, ann })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.docs.iter().find(|d| d.id == id)
    }

    /// Top-k hits for `query`, filtered by `tickers` if given. When a
    /// filter is applied, over-fetches `max(k*10, 50)` candidates
    /// before filtering to preserve recall.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        tickers: Option<&[String]>,
        embedder: &dyn EmbeddingFn,
    ) -> Vec<RetrievalHit> {
        if query.trim().is_empty() || self.docs.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut q = embedder.embed(query);
        l2_normalize(&mut q);

        let fetch_k = if tickers.is_some() {
            (k * 10).max(50)
        } else {
            k
        };

        let mut candidates: Vec<(f32, usize)> = if let Some(ann) = &self.ann {
            let mut search = Search::default();
            let point = EmbeddingPoint { values: q.clone() };
            ann.search(&point, &mut search)
                .take(fetch_k)
                .map(|item| {
                    let idx = *item.value;
                    (inner_product(&q, &self.embeddings[idx].vector), idx)
                })
                .collect()
        } else {
            let mut all: Vec<(f32, usize)> = self
                .embeddings
                .iter()
                .enumerate()
                .map(|(i, e)| (inner_product(&q, &e.vector), i))
                .collect();
            all.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            all.truncate(fetch_k);
            all
        };

        // Ties broken by ascending document id, same discipline as
        // LexicalIndex.
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.docs[a.1].id.cmp(&self.docs[b.1].id))
        });

        candidates
            .into_iter()
            .map(|(score, idx)| (score, &self.docs[idx]))
            .filter(|(_, doc)| tickers.map(|t| doc.matches_filter(t)).unwrap_or(true))
            .take(k)
            .enumerate()
            .map(|(rank, (score, doc))| RetrievalHit {
                document_id: doc.id.clone(),
                score: score as f64,
                rank,
            })
            .collect()
    }
}
