use bson::Document as BsonDocument;
use std::iter::FusedIterator;
use std::sync::Arc;

use super::eval::{apply_slice, eval_clauses, project};
use super::types::{Clause, Projection, Slice};
use crate::document::{Document, DocumentState};
use crate::model::{Model, Stored};

pub(crate) enum Source {
    /// Natural order: resume the scan after the last position seen.
    Scan { after: Option<u64> },
    /// Sorted: positions computed up front, documents fetched one at a time.
    Ordered(std::vec::IntoIter<u64>),
}

/// Lazy, single-pass iterator over a resolved query.
///
/// At most one document is materialized per step. The model's read lock is
/// held only while a step runs, so open cursors never block writers for long.
/// Once `next` returns `None` it keeps returning `None`.
pub struct Cursor {
    model: Arc<Model>,
    clauses: Vec<Clause>,
    projection: Option<Projection>,
    slices: Vec<(String, Slice)>,
    source: Source,
    to_skip: usize,
    remaining: Option<usize>,
    exhausted: bool,
    yielded: usize,
}

impl Cursor {
    pub(crate) fn new(
        model: Arc<Model>,
        clauses: Vec<Clause>,
        projection: Option<Projection>,
        slices: Vec<(String, Slice)>,
        source: Source,
        skip: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            model,
            clauses,
            projection,
            slices,
            source,
            to_skip: skip,
            remaining: limit,
            exhausted: false,
            yielded: 0,
        }
    }

    fn next_stored(&mut self) -> Option<Stored> {
        if self.exhausted || self.remaining == Some(0) {
            self.exhausted = true;
            return None;
        }
        loop {
            let next = match &mut self.source {
                Source::Scan { after } => self.model.next_match_after(*after, &self.clauses).map(|(seq, s)| {
                    *after = Some(seq);
                    s
                }),
                Source::Ordered(seqs) => match seqs.next() {
                    // deleted or changed since the cursor opened
                    Some(seq) => match self.model.fetch(seq) {
                        Some(s) if eval_clauses(&s.data, &self.clauses) => Some(s),
                        _ => continue,
                    },
                    None => None,
                },
            };
            let Some(stored) = next else {
                self.exhausted = true;
                return None;
            };
            if self.to_skip > 0 {
                self.to_skip -= 1;
                continue;
            }
            if let Some(r) = self.remaining.as_mut() {
                *r -= 1;
            }
            self.yielded += 1;
            return Some(stored);
        }
    }

    fn shape(&self, data: BsonDocument) -> (BsonDocument, bool) {
        let mut out = match &self.projection {
            Some(p) => project(&data, p),
            None => data,
        };
        for (path, s) in &self.slices {
            apply_slice(&mut out, path, *s);
        }
        (out, self.projection.is_some() || !self.slices.is_empty())
    }

    /// Next document bound to its model.
    pub fn next_doc(&mut self) -> Option<Document> {
        let stored = self.next_stored()?;
        let (data, partial) = self.shape(stored.data);
        let state = if partial { DocumentState::Partial } else { DocumentState::Loaded };
        let mut doc = Document::bind(Arc::clone(&self.model), stored.id, data, state);
        doc.sliced = self.slices.iter().map(|(path, _)| path.clone()).collect();
        Some(doc)
    }

    /// Next document as a plain value.
    pub fn next_plain(&mut self) -> Option<BsonDocument> {
        let stored = self.next_stored()?;
        Some(self.shape(stored.data).0)
    }

    /// Yields to the runtime before each step so long scans share the executor.
    pub async fn next_async(&mut self) -> Option<Document> {
        if self.exhausted {
            return None;
        }
        tokio::task::yield_now().await;
        self.next_doc()
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Documents returned so far.
    #[must_use]
    pub const fn yielded(&self) -> usize {
        self.yielded
    }

    #[must_use]
    pub fn to_vec(self) -> Vec<Document> {
        self.collect()
    }

    /// Plain-value view of the remaining results.
    pub fn lean(mut self) -> impl Iterator<Item = BsonDocument> {
        std::iter::from_fn(move || self.next_plain())
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_doc()
    }
}

impl FusedIterator for Cursor {}
