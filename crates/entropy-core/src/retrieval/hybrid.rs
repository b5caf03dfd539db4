//! Weighted reciprocal-rank fusion over the lexical and semantic
//! indexes.
//!
//! Sums weighted `1/(k_rrf + rank)` contributions per document id
//! across both rankers, with the RRF constant and per-ranker weights
//! configurable rather than hardcoded.

use std::collections::HashMap;

use crate::config::RetrievalConfig;
use crate::data::RetrievalHit;

use super::lexical::LexicalIndex;
use super::semantic::{EmbeddingFn, SemanticIndex};

/// Fused hit: combined score plus the semantic rank used for
/// tie-breaking.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub document_id: String,
    pub score: f64,
}

pub struct HybridRetriever<'a> {
    lexical: &'a LexicalIndex,
    semantic: &'a SemanticIndex,
    config: RetrievalConfig,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(lexical: &'a LexicalIndex, semantic: &'a SemanticIndex, config: RetrievalConfig) -> Self {
        Self {
            lexical,
            semantic,
            config,
        }
    }

    /// Fuse both rankers' top-k hits for `query`. Queries both indexes
    /// concurrently with `k_each = max(2k, 20)`;
    /// degrades to the available index if the other reports empty
    /// because it holds zero documents.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        tickers: Option<&[String]>,
        embedder: &(dyn EmbeddingFn + Sync),
    ) -> Vec<FusedHit> {
        if k == 0 {
            return Vec::new();
        }
        let k_each = (2 * k).max(20);

        let lexical_unavailable = self.lexical.is_empty();
        let semantic_unavailable = self.semantic.is_empty();

        let (lex_hits, sem_hits) = tokio::join!(
            async {
                if lexical_unavailable {
                    Vec::new()
                } else {
                    self.lexical.search(query, k_each, tickers)
                }
            },
            async {
                if semantic_unavailable {
                    Vec::new()
                } else {
                    self.semantic.search(query, k_each, tickers, embedder)
                }
            }
        );

        if lexical_unavailable && semantic_unavailable {
            return Vec::new();
        }
        if lexical_unavailable {
            return sem_hits
                .into_iter()
                .take(k)
                .map(|h| FusedHit {
                    document_id: h.document_id,
                    score: h.score,
                })
                .collect();
        }
        if semantic_unavailable {
            return lex_hits
                .into_iter()
                .take(k)
                .map(|h| FusedHit {
                    document_id: h.document_id,
                    score: h.score,
                })
                .collect();
        }

        self.fuse(&lex_hits, &sem_hits, k)
    }

    fn fuse(&self, lexical: &[RetrievalHit], semantic: &[RetrievalHit], k: usize) -> Vec<FusedHit> {
        let mut combined: HashMap<String, f64> = HashMap::new();
        let mut semantic_rank: HashMap<String, usize> = HashMap::new();

        for hit in lexical {
            let contribution = self.config.lexical_weight / (self.config.rrf_k + (hit.rank + 1) as f64);
            *combined.entry(hit.document_id.clone()).or_insert(0.0) += contribution;
        }
        for hit in semantic {
            let contribution = self.config.semantic_weight / (self.config.rrf_k + (hit.rank + 1) as f64);
            *combined.entry(hit.document_id.clone()).or_insert(0.0) += contribution;
            semantic_rank.insert(hit.document_id.clone(), hit.rank);
        }

        let mut fused: Vec<(String, f64)> = combined.into_iter().collect();
        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ra = semantic_rank.get(&a.0).copied().unwrap_or(usize::MAX);
                    let rb = semantic_rank.get(&b.0).copied().unwrap_or(usize::MAX);
                    ra.cmp(&rb)
                })
                .then_with(|| a.0.cmp(&b.0))
        });

        fused
            .into_iter()
            .take(k)
            .map(|(document_id, score)| FusedHit { document_id, score })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::semantic::HashingEmbedder;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn doc(id: &str, body: &str, tickers: &[&str]) -> crate::data::Document {
        crate::data::Document {
            id: id.to_string(),
            title: id.to_string(),
            body: body.to_string(),
            published_at: Utc::now(),
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            publisher: "wire".into(),
            link: format!("https://example.com/{id}"),
        }
    }

    fn sample_docs() -> Vec<crate::data::Document> {
        vec![
            doc("d1", "Apple reports record quarterly earnings growth", &["AAPL"]),
            doc("d2", "Microsoft cloud revenue grows steadily this quarter", &["MSFT"]),
            doc("d3", "Apple suppliers ramp up iPhone production ahead of launch", &["AAPL"]),
            doc("d4", "Tesla deliveries miss analyst estimates", &["TSLA"]),
        ]
    }

    #[tokio::test]
    async fn result_length_bounded_and_unique() {
        let docs = sample_docs();
        let embedder = HashingEmbedder;
        let lexical = LexicalIndex::build(docs.clone());
        let semantic = SemanticIndex::build(docs, &embedder);
        let retriever = HybridRetriever::new(&lexical, &semantic, RetrievalConfig::default());

        let hits = retriever.search("apple earnings", 2, None, &embedder).await;
        assert!(hits.len() <= 2);
        let ids: HashSet<_> = hits.iter().map(|h| &h.document_id).collect();
        assert_eq!(ids.len(), hits.len());
    }

    #[tokio::test]
    async fn degrades_to_available_index_when_other_empty() {
        let docs = sample_docs();
        let embedder = HashingEmbedder;
        let lexical = LexicalIndex::build(docs);
        let semantic = SemanticIndex::empty();
        let retriever = HybridRetriever::new(&lexical, &semantic, RetrievalConfig::default());

        let hits = retriever.search("apple", 3, None, &embedder).await;
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn both_indexes_empty_returns_empty() {
        let lexical = LexicalIndex::empty();
        let semantic = SemanticIndex::empty();
        let embedder = HashingEmbedder;
        let retriever = HybridRetriever::new(&lexical, &semantic, RetrievalConfig::default());

        let hits = retriever.search("apple", 3, None, &embedder).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn filter_correctness() {
        let docs = sample_docs();
        let embedder = HashingEmbedder;
        let lexical = LexicalIndex::build(docs.clone());
        let semantic = SemanticIndex::build(docs.clone(), &embedder);
        let retriever = HybridRetriever::new(&lexical, &semantic, RetrievalConfig::default());

        let hits = retriever
            .search("earnings", 5, Some(&["AAPL".to_string()]), &embedder)
            .await;
        for hit in &hits {
            let d = docs.iter().find(|d| d.id == hit.document_id).unwrap();
            assert!(d.tickers.iter().any(|t| t == "AAPL"));
        }
    }

    /// Builds `n` synthetic hits named `{prefix}{i}`, ranked starting at
    /// `rank_offset`. Callers give the two method's hit lists disjoint
    /// rank ranges so no two hits ever land on the same RRF score —
    /// that's what lets the ordering below be asserted exactly rather
    /// than just "same score per document".
    fn synthetic_hits(prefix: &str, n: usize, rank_offset: usize) -> Vec<RetrievalHit> {
        (0..n)
            .map(|i| RetrievalHit {
                document_id: format!("{prefix}{i}"),
                score: 0.0,
                rank: rank_offset + i,
            })
            .collect()
    }

    proptest! {
        // `fuse`'s two arguments play asymmetric roles (the second feeds
        // the semantic-rank tie-break), so swapping them only produces
        // the same order once weights are equal *and* no two hits tie on
        // score; disjoint rank ranges across the two lists guarantee the
        // latter.
        #[test]
        fn fusion_is_commutative_over_method_order(n_a in 0usize..8, n_b in 0usize..8) {
            let a = synthetic_hits("a", n_a, 0);
            let b = synthetic_hits("b", n_b, n_a);

            let config = RetrievalConfig {
                rrf_k: 60.0,
                semantic_weight: 2.0,
                lexical_weight: 2.0,
            };
            let lexical = LexicalIndex::empty();
            let semantic = SemanticIndex::empty();
            let retriever = HybridRetriever::new(&lexical, &semantic, config);

            let k = n_a + n_b;
            let forward: Vec<String> = retriever
                .fuse(&a, &b, k)
                .into_iter()
                .map(|h| h.document_id)
                .collect();
            let backward: Vec<String> = retriever
                .fuse(&b, &a, k)
                .into_iter()
                .map(|h| h.document_id)
                .collect();

            prop_assert_eq!(forward, backward);
        }
    }
}
