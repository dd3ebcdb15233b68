//! Keyword matcher used when no vector index is configured.

use std::sync::RwLock;

use crate::models::{Document, SearchResult};

/// In-memory document set scored by term containment.
#[derive(Debug, Default)]
pub struct FallbackMatcher {
    documents: RwLock<Vec<Document>>,
}

impl FallbackMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents with an id already present replace the stored copy.
    pub fn add_documents(&self, documents: impl IntoIterator<Item = Document>) {
        let mut stored = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for document in documents {
            match stored.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document,
                None => stored.push(document),
            }
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut stored = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = stored.len();
        stored.retain(|d| d.id != id);
        stored.len() != before
    }

    pub fn len(&self) -> usize {
        match self.documents.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank every document by [`containment_score`], best first, ties in insertion order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let stored = match self.documents.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let query = query.to_lowercase();
        let mut results: Vec<SearchResult> = stored
            .iter()
            .map(|doc| SearchResult {
                id: doc.id.clone(),
                score: containment_score(&query, &doc.content.to_lowercase()),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        results
    }
}

/// Fraction of query terms that appear as a substring of some content word.
/// Both inputs are expected lower-cased.
pub fn containment_score(query: &str, content: &str) -> f64 {
    let query_words: Vec<&str> = query.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }

    let content_words: Vec<&str> = content.split_whitespace().collect();
    let matches = query_words
        .iter()
        .filter(|word| content_words.iter().any(|w| w.contains(*word)))
        .count();

    matches as f64 / query_words.len() as f64
}
