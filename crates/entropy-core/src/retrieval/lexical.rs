//! BM25-style lexical ranker over an in-memory corpus.
//!
//! Loads and queries a pre-built, serialized artifact rather than
//! maintaining a live FTS index: the core only ranks documents, it
//! does not ingest or tokenize a live corpus on write.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::{Document, RetrievalHit};

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Lowercase, whitespace/punctuation split, no stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PostingEntry {
    term_frequency: usize,
}

/// Serialized per-document statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocStats {
    document_id: String,
    length: usize,
    term_counts: HashMap<String, usize>,
}

/// BM25 ranker. Read-only after construction; safe to share across
/// agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    docs: Vec<Document>,
    stats: Vec<DocStats>,
    /// document frequency per term, for idf.
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl LexicalIndex {
    pub fn empty() -> Self {
        Self {
            docs: Vec::new(),
            stats: Vec::new(),
            doc_freq: HashMap::new(),
            avg_doc_len: 0.0,
        }
    }

    /// Build the index from a corpus. Ticker symbols are concatenated
    /// as a prefix to the body before tokenization so an
    /// exact symbol query scores strongly.
    pub fn build(docs: Vec<Document>) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut stats = Vec::with_capacity(docs.len());
        let mut total_len = 0usize;

        for doc in &docs {
            let prefixed = format!("{} {}", doc.tickers.join(" "), doc.body);
            let tokens = tokenize(&prefixed);
            total_len += tokens.len();

            let mut term_counts: HashMap<String, usize> = HashMap::new();
            for tok in &tokens {
                *term_counts.entry(tok.clone()).or_insert(0) += 1;
            }
            for term in term_counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }

            stats.push(DocStats {
                document_id: doc.id.clone(),
                length: tokens.len(),
                term_counts,
            });
        }

        let avg_doc_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            docs,
            stats,
            doc_freq,
            avg_doc_len,
        }
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

    /// Writes the tokenized corpus and statistics to a single file;
    /// the whole struct round-trips through serde as-is.
    pub fn save(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let file = std::fs::File::open(path)?;
        let index = serde_json::from_reader(file)?;
        Ok(index)
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, query_tokens: &[String], stats: &DocStats) -> f64 {
        query_tokens
            .iter()
            .map(|term| {
                let tf = *stats.term_counts.get(term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf(term);
                let denom = tf + K1 * (1.0 - B + B * stats.length as f64 / self.avg_doc_len.max(1.0));
                idf * (tf * (K1 + 1.0)) / denom
            })
            .sum()
    }

    /// Top-k hits for `query`, optionally filtered to documents whose
    /// ticker set intersects `tickers`. Empty query or empty index
    /// returns an empty list, never an error.
    pub fn search(&self, query: &str, k: usize, tickers: Option<&[String]>) -> Vec<RetrievalHit> {
        if query.trim().is_empty() || self.docs.is_empty() || k == 0 {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, &Document)> = self
            .stats
            .iter()
            .zip(self.docs.iter())
            .filter(|(_, doc)| tickers.map(|t| doc.matches_filter(t)).unwrap_or(true))
            .map(|(stats, doc)| (self.score(&query_tokens, stats), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Descending score, ties broken by ascending document id.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (score, doc))| RetrievalHit {
                document_id: doc.id.clone(),
                score,
                rank,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, body: &str, tickers: &[&str]) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_string(),
            body: body.to_string(),
            published_at: Utc::now(),
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            publisher: "wire".into(),
            link: format!("https://example.com/{id}"),
        }
    }

    fn sample_index() -> LexicalIndex {
        LexicalIndex::build(vec![
            doc("d1", "Apple reports record quarterly earnings", &["AAPL"]),
            doc("d2", "Microsoft cloud revenue grows steadily", &["MSFT"]),
            doc("d3", "Apple suppliers ramp up iPhone production", &["AAPL"]),
        ])
    }

    #[test]
    fn empty_query_returns_empty() {
        let idx = sample_index();
        assert!(idx.search("", 5, None).is_empty());
    }

    #[test]
    fn empty_index_returns_empty() {
        let idx = LexicalIndex::empty();
        assert!(idx.search("earnings", 5, None).is_empty());
    }

    #[test]
    fn ticker_prefix_boosts_symbol_queries() {
        let idx = sample_index();
        let hits = idx.search("AAPL", 5, None);
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.document_id == "d1" || h.document_id == "d3"));
    }

    #[test]
    fn filter_restricts_to_matching_tickers() {
        let idx = sample_index();
        let hits = idx.search("earnings", 5, Some(&["MSFT".to_string()]));
        assert!(hits.is_empty());
    }

    #[test]
    fn results_are_deterministic() {
        let idx = sample_index();
        let a = idx.search("apple", 5, None);
        let b = idx.search("apple", 5, None);
        assert_eq!(a, b);
    }

    #[test]
    fn save_then_load_round_trips_search_results() {
        let idx = sample_index();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lexical.json");
        idx.save(&path).expect("save");
        let loaded = LexicalIndex::load(&path).expect("load");
        assert_eq!(idx.search("apple", 5, None), loaded.search("apple", 5, None));
        assert_eq!(idx.len(), loaded.len());
    }
}
