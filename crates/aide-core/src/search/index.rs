//! In-memory full-text index over [`SearchDocument`]s.
//!
//! Documents are tokenized on Unicode word boundaries and lowercased. The
//! `title` and `text` fields are searchable; `title` and `category` are
//! stored verbatim for result display. Ranking is BM25 per field with the
//! title boosted, summed over query terms.
//!
//! Every collection in the index is ordered, so two indexes holding the same
//! data serialize identically and answer queries identically.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Category assigned to documents built from files.
pub const CATEGORY_FILE: &str = "file";

const K1: f64 = 1.2;
const B: f64 = 0.7;
const TITLE_BOOST: f64 = 2.0;
/// Weight of a term reached only through prefix expansion.
const PREFIX_WEIGHT: f64 = 0.5;

const TITLE: usize = 0;
const TEXT: usize = 1;
const FIELD_COUNT: usize = 2;

/// An indexable unit. `id` is the dedup and retrieval key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub category: String,
}

impl SearchDocument {
    /// Build a document from a file's path and raw bytes.
    ///
    /// The content is decoded as UTF-8, replacing invalid sequences.
    pub fn from_file(path: &Path, bytes: &[u8]) -> Self {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: path.to_string_lossy().into_owned(),
            title,
            text: String::from_utf8_lossy(bytes).into_owned(),
            category: CATEGORY_FILE.to_string(),
        }
    }
}

/// Fields kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFields {
    pub title: String,
    pub category: String,
}

/// Query options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of hits; all hits when `None`.
    pub limit: Option<usize>,
    /// Also match indexed terms that start with a query term.
    pub prefix: bool,
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub title: String,
    pub category: String,
    /// Query terms that matched this document, in query order.
    pub matched_terms: Vec<String>,
}

/// Summary figures for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
}

/// Split text into lowercased terms.
///
/// Unicode word boundaries first, then any remaining punctuation inside a
/// word (`budget.txt`, `it's`) splits it further.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.unicode_words()
        .flat_map(|word| word.split(|c: char| !c.is_alphanumeric()))
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
}

/// The inverted index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    next_doc: u32,
    /// External id → internal document number.
    doc_numbers: BTreeMap<String, u32>,
    /// Internal document number → external id.
    doc_ids: BTreeMap<u32, String>,
    stored: BTreeMap<u32, StoredFields>,
    /// Token count per field, per document.
    field_lengths: BTreeMap<u32, [u32; FIELD_COUNT]>,
    total_field_lengths: [u64; FIELD_COUNT],
    /// Term → document → term frequency per field.
    postings: BTreeMap<String, BTreeMap<u32, [u32; FIELD_COUNT]>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.doc_numbers.contains_key(id)
    }

    /// Stored fields of a document.
    pub fn stored_fields(&self, id: &str) -> Option<&StoredFields> {
        let number = self.doc_numbers.get(id)?;
        self.stored.get(number)
    }

    /// All indexed document ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.doc_numbers.keys().map(String::as_str)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.len(),
            terms: self.postings.len(),
        }
    }

    /// Add one document, replacing any document with the same id.
    pub fn add(&mut self, document: SearchDocument) {
        if self.contains(&document.id) {
            self.remove(&document.id);
        }

        let number = self.next_doc;
        self.next_doc += 1;

        let mut lengths = [0u32; FIELD_COUNT];
        for (field, content) in [(TITLE, &document.title), (TEXT, &document.text)] {
            for token in tokenize(content) {
                lengths[field] += 1;
                let entry = self
                    .postings
                    .entry(token)
                    .or_default()
                    .entry(number)
                    .or_insert([0; FIELD_COUNT]);
                entry[field] += 1;
            }
        }

        for (total, len) in self.total_field_lengths.iter_mut().zip(lengths) {
            *total += u64::from(len);
        }
        self.field_lengths.insert(number, lengths);
        self.stored.insert(
            number,
            StoredFields {
                title: document.title,
                category: document.category,
            },
        );
        self.doc_numbers.insert(document.id.clone(), number);
        self.doc_ids.insert(number, document.id);
    }

    /// Add a batch of documents.
    pub fn add_all(&mut self, documents: impl IntoIterator<Item = SearchDocument>) {
        for document in documents {
            self.add(document);
        }
    }

    /// Remove a document. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(number) = self.doc_numbers.remove(id) else {
            return false;
        };
        self.doc_ids.remove(&number);
        self.stored.remove(&number);
        if let Some(lengths) = self.field_lengths.remove(&number) {
            for (total, len) in self.total_field_lengths.iter_mut().zip(lengths) {
                *total -= u64::from(len);
            }
        }
        self.postings.retain(|_, docs| {
            docs.remove(&number);
            !docs.is_empty()
        });
        true
    }

    /// Ranked matches for `query` against title and text.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let mut query_terms: Vec<String> = Vec::new();
        for token in tokenize(query) {
            if !query_terms.contains(&token) {
                query_terms.push(token);
            }
        }
        if query_terms.is_empty() || self.is_empty() {
            return Vec::new();
        }

        let doc_count = self.len() as f64;
        let avg_lengths = self.total_field_lengths.map(|total| {
            let avg = total as f64 / doc_count;
            if avg > 0.0 { avg } else { 1.0 }
        });

        let mut scores: BTreeMap<u32, f64> = BTreeMap::new();
        let mut matched: BTreeMap<u32, BTreeSet<usize>> = BTreeMap::new();

        for (query_index, query_term) in query_terms.iter().enumerate() {
            for (docs, weight) in self.expand(query_term, options.prefix) {
                let doc_freq = field_doc_freq(docs);
                for (number, freqs) in docs {
                    let lengths = self.field_lengths.get(number).copied().unwrap_or_default();
                    let mut score = 0.0;
                    for field in [TITLE, TEXT] {
                        if freqs[field] == 0 {
                            continue;
                        }
                        let boost = if field == TITLE { TITLE_BOOST } else { 1.0 };
                        score += boost
                            * bm25(
                                f64::from(freqs[field]),
                                doc_freq[field] as f64,
                                doc_count,
                                f64::from(lengths[field]),
                                avg_lengths[field],
                            );
                    }
                    *scores.entry(*number).or_insert(0.0) += weight * score;
                    matched.entry(*number).or_default().insert(query_index);
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .filter_map(|(number, score)| {
                let id = self.doc_ids.get(&number)?;
                let stored = self.stored.get(&number)?;
                let matched_terms = matched
                    .get(&number)
                    .map(|set| set.iter().map(|&i| query_terms[i].clone()).collect())
                    .unwrap_or_default();
                Some(SearchHit {
                    id: id.clone(),
                    score,
                    title: stored.title.clone(),
                    category: stored.category.clone(),
                    matched_terms,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }
        hits
    }

    /// Index terms a query term reaches, with their weights.
    fn expand<'a>(
        &'a self,
        query_term: &'a str,
        prefix: bool,
    ) -> Vec<(&'a BTreeMap<u32, [u32; FIELD_COUNT]>, f64)> {
        if !prefix {
            return self
                .postings
                .get(query_term)
                .map(|docs| vec![(docs, 1.0)])
                .unwrap_or_default();
        }
        self.postings
            .range::<str, _>((std::ops::Bound::Included(query_term), std::ops::Bound::Unbounded))
            .take_while(|(term, _)| term.starts_with(query_term))
            .map(|(term, docs)| {
                let weight = if term == query_term { 1.0 } else { PREFIX_WEIGHT };
                (docs, weight)
            })
            .collect()
    }
}

/// Documents containing a term, per field.
fn field_doc_freq(docs: &BTreeMap<u32, [u32; FIELD_COUNT]>) -> [usize; FIELD_COUNT] {
    let mut freq = [0usize; FIELD_COUNT];
    for freqs in docs.values() {
        for field in [TITLE, TEXT] {
            if freqs[field] > 0 {
                freq[field] += 1;
            }
        }
    }
    freq
}

fn bm25(tf: f64, doc_freq: f64, doc_count: f64, field_len: f64, avg_len: f64) -> f64 {
    let idf = (1.0 + (doc_count - doc_freq + 0.5) / (doc_freq + 0.5)).ln();
    let norm = tf + K1 * (1.0 - B + B * field_len / avg_len);
    idf * tf * (K1 + 1.0) / norm
}
