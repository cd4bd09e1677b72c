use bson::Document as BsonDocument;
use std::sync::Arc;
use std::time::Instant;

use super::cursor::{Cursor, Source};
use super::types::{Clause, Projection, Slice, SortSpec};
use crate::document::Document;
use crate::model::Model;

/// A query frozen at execution time. Owns everything it needs, so it can
/// move onto a blocking worker.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub model: Arc<Model>,
    pub clauses: Vec<Clause>,
    pub sort: Vec<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub projection: Option<Projection>,
    pub slices: Vec<(String, Slice)>,
}

impl Plan {
    pub(crate) const fn strategy(&self) -> &'static str {
        if self.sort.is_empty() { "scan" } else { "sorted" }
    }

    pub(crate) fn open(self) -> Cursor {
        let source = if self.sort.is_empty() {
            Source::Scan { after: None }
        } else {
            Source::Ordered(self.model.sorted_positions(&self.clauses, &self.sort).into_iter())
        };
        Cursor::new(self.model, self.clauses, self.projection, self.slices, source, self.skip, self.limit)
    }

    fn trace(&self) -> Trace {
        Trace { model: Arc::clone(&self.model), strategy: self.strategy(), skip: self.skip, limit: self.limit }
    }

    pub(crate) fn run(self) -> Vec<Document> {
        let start = Instant::now();
        let trace = self.trace();
        let docs: Vec<Document> = self.open().collect();
        trace.log("find", start, docs.len());
        docs
    }

    pub(crate) fn run_lean(self) -> Vec<BsonDocument> {
        let start = Instant::now();
        let trace = self.trace();
        let docs: Vec<BsonDocument> = self.open().lean().collect();
        trace.log("lean", start, docs.len());
        docs
    }

    /// Matches regardless of skip and limit.
    pub(crate) fn count(&self) -> usize {
        let start = Instant::now();
        let n = self.model.count_matching(&self.clauses);
        self.trace().log("count", start, n);
        n
    }
}

/// The fields of a query record, taken before the plan is consumed by its cursor.
struct Trace {
    model: Arc<Model>,
    strategy: &'static str,
    skip: usize,
    limit: Option<usize>,
}

impl Trace {
    fn log(&self, op: &str, start: Instant, result_count: usize) {
        crate::qlog!(
            "{{\"op\":\"{}\",\"collection\":\"{}\",\"strategy\":\"{}\",\"duration_us\":{},\"result_count\":{},\"limit\":{},\"skip\":{}}}",
            op,
            self.model.name(),
            self.strategy,
            start.elapsed().as_micros(),
            result_count,
            self.limit.unwrap_or(0),
            self.skip
        );
    }
}
