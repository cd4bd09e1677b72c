use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use crate::config::OdmConfig;
use crate::document::{Document, DocumentState};
use crate::errors::DbError;
use crate::query::{
    Clause, Query, SortSpec, compare_keys, eval_clauses, get_path, get_path_mut, parse_filter, sort_key,
};
use crate::schema::Schema;
use crate::schema::validate::{CREATED_AT, UPDATED_AT};
use crate::types::{DocumentId, ID_FIELD};

#[derive(Debug, Clone)]
pub(crate) struct Stored {
    pub id: DocumentId,
    pub data: BsonDocument,
}

/// Documents keyed by insertion sequence so scans see a stable natural order.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub docs: BTreeMap<u64, Stored>,
    pub by_id: HashMap<DocumentId, u64>,
    next_seq: u64,
}

impl Store {
    pub(crate) fn insert(&mut self, id: DocumentId, data: BsonDocument) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(id.clone(), seq);
        self.docs.insert(seq, Stored { id, data });
    }

    pub(crate) fn remove_seq(&mut self, seq: u64) -> bool {
        match self.docs.remove(&seq) {
            Some(s) => {
                self.by_id.remove(&s.id);
                true
            }
            None => false,
        }
    }
}

/// A collection bound to a schema.
#[derive(Debug)]
pub struct Model {
    name: String,
    schema: Schema,
    config: Arc<OdmConfig>,
    pub(crate) store: RwLock<Store>,
}

impl Model {
    #[must_use]
    pub fn new(name: &str, schema: Schema, config: Arc<OdmConfig>) -> Self {
        Self { name: name.to_string(), schema, config, store: RwLock::new(Store::default()) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn config(&self) -> &OdmConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds an unsaved document. A caller-supplied `_id` must be a UUID string.
    ///
    /// # Errors
    /// Returns `DbError::Cast` when `_id` is present but not a UUID string.
    pub fn new_document(self: &Arc<Self>, data: BsonDocument) -> Result<Document, DbError> {
        let id = match data.get(ID_FIELD) {
            Some(Bson::String(s)) => s.parse()?,
            Some(other) => return Err(DbError::Cast(format!("`{ID_FIELD}` must be a UUID string, got {other}"))),
            None => DocumentId::new(),
        };
        Ok(Document::bind(Arc::clone(self), id, data, DocumentState::New))
    }

    /// Validates and inserts one document.
    ///
    /// # Errors
    /// Returns `DbError::Validation` if the data does not satisfy the schema and
    /// `DbError::Cast` for a malformed `_id`.
    pub fn create(self: &Arc<Self>, data: BsonDocument) -> Result<Document, DbError> {
        let mut doc = self.new_document(data)?;
        doc.save()?;
        Ok(doc)
    }

    /// Validates every document first; nothing is inserted if any fails.
    ///
    /// # Errors
    /// Returns the first validation error, or `DbError::QueryError` on duplicate ids.
    pub fn insert_many(self: &Arc<Self>, docs: Vec<BsonDocument>) -> Result<Vec<Document>, DbError> {
        let mut staged = Vec::with_capacity(docs.len());
        for data in docs {
            let mut doc = self.new_document(data)?;
            doc.data = self.prepare(&doc.data, doc.id(), None)?;
            staged.push(doc);
        }
        let mut store = self.store.write();
        for doc in &staged {
            if store.by_id.contains_key(doc.id()) {
                return Err(DbError::QueryError(format!("duplicate key {}", doc.id())));
            }
        }
        for doc in &mut staged {
            store.insert(doc.id().clone(), doc.data.clone());
            doc.state = DocumentState::Loaded;
        }
        log::debug!("{}: inserted {} documents", self.name, staged.len());
        Ok(staged)
    }

    /// Schema validation plus identity and timestamp stamping.
    pub(crate) fn prepare(
        &self,
        data: &BsonDocument,
        id: &DocumentId,
        existing: Option<&BsonDocument>,
    ) -> Result<BsonDocument, DbError> {
        let mut out = self.schema.validate(data)?;
        out.insert(ID_FIELD, Bson::from(id));
        if self.schema.options.timestamps {
            let now = Bson::DateTime(bson::DateTime::now());
            let created = existing.and_then(|e| e.get(CREATED_AT)).cloned().unwrap_or_else(|| now.clone());
            out.insert(CREATED_AT, created);
            out.insert(UPDATED_AT, now);
        }
        Ok(out)
    }

    pub(crate) fn save_document(
        &self,
        id: &DocumentId,
        data: &BsonDocument,
        state: DocumentState,
        sliced: &[String],
    ) -> Result<BsonDocument, DbError> {
        let mut store = self.store.write();
        let seq = store.by_id.get(id).copied();
        let existing = seq.and_then(|s| store.docs.get(&s)).map(|s| s.data.clone());
        let base = match (state, &existing) {
            (DocumentState::Partial, Some(stored)) => {
                let mut merged = stored.clone();
                merge_into(&mut merged, data);
                for path in sliced {
                    if let (Some(full), Some(slot)) = (get_path(stored, path), get_path_mut(&mut merged, path)) {
                        *slot = full.clone();
                    }
                }
                merged
            }
            _ => data.clone(),
        };
        let prepared = self.prepare(&base, id, existing.as_ref())?;
        match (seq, state) {
            (Some(s), _) => {
                if let Some(slot) = store.docs.get_mut(&s) {
                    slot.data = prepared.clone();
                }
            }
            (None, DocumentState::New) => store.insert(id.clone(), prepared.clone()),
            (None, _) => return Err(DbError::NoSuchDocument(id.to_string())),
        }
        log::debug!("{}: saved {id}", self.name);
        Ok(prepared)
    }

    pub(crate) fn remove_by_id(&self, id: &DocumentId) -> bool {
        let mut store = self.store.write();
        let removed = store.by_id.get(id).copied().is_some_and(|seq| store.remove_seq(seq));
        if removed {
            log::debug!("{}: removed {id}", self.name);
        }
        removed
    }

    #[must_use]
    pub fn find_by_id(self: &Arc<Self>, id: &DocumentId) -> Option<Document> {
        let store = self.store.read();
        let stored = store.by_id.get(id).and_then(|seq| store.docs.get(seq))?;
        Some(Document::bind(Arc::clone(self), stored.id.clone(), stored.data.clone(), DocumentState::Loaded))
    }

    #[must_use]
    pub fn find(self: &Arc<Self>) -> Query {
        Query::new(Arc::clone(self))
    }

    /// `find(filter)`: a query seeded with a filter document.
    #[must_use]
    pub fn find_filter(self: &Arc<Self>, filter: BsonDocument) -> Query {
        self.find().filter(filter)
    }

    #[must_use]
    pub fn where_(self: &Arc<Self>, path: &str) -> Query {
        self.find().where_(path)
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the filter is malformed.
    pub fn find_one(self: &Arc<Self>, filter: BsonDocument) -> Result<Option<Document>, DbError> {
        self.find_filter(filter).exec_one()
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the filter is malformed.
    pub fn count_documents(&self, filter: &BsonDocument) -> Result<usize, DbError> {
        let clauses = parse_filter(filter, &self.config)?;
        Ok(self.count_matching(&clauses))
    }

    pub(crate) fn count_matching(&self, clauses: &[Clause]) -> usize {
        self.store.read().docs.values().filter(|s| eval_clauses(&s.data, clauses)).count()
    }

    /// Invokes a static method declared on the schema.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchMethod` for unknown names, or whatever the method returns.
    pub fn call_static(&self, name: &str, args: &[Bson]) -> Result<Bson, DbError> {
        let f = self
            .schema
            .get_static(name)
            .ok_or_else(|| DbError::NoSuchMethod(format!("{}.{name}", self.name)))?;
        f(self, args)
    }

    /// First matching document after position `after`, evaluated under the read lock.
    pub(crate) fn next_match_after(&self, after: Option<u64>, clauses: &[Clause]) -> Option<(u64, Stored)> {
        let store = self.store.read();
        let mut range = match after {
            Some(a) => store.docs.range((Excluded(a), Unbounded)),
            None => store.docs.range(..),
        };
        range.find(|(_, s)| eval_clauses(&s.data, clauses)).map(|(seq, s)| (*seq, s.clone()))
    }

    pub(crate) fn fetch(&self, seq: u64) -> Option<Stored> {
        self.store.read().docs.get(&seq).cloned()
    }

    /// Positions of all matches in sort order; ties keep insertion order.
    pub(crate) fn sorted_positions(&self, clauses: &[Clause], sort: &[SortSpec]) -> Vec<u64> {
        let mut keyed: Vec<(Vec<Option<Bson>>, u64)> = {
            let store = self.store.read();
            store
                .docs
                .iter()
                .filter(|(_, s)| eval_clauses(&s.data, clauses))
                .map(|(seq, s)| (sort_key(&s.data, sort), *seq))
                .collect()
        };
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, sort).then(a.1.cmp(&b.1)));
        keyed.into_iter().map(|(_, seq)| seq).collect()
    }
}

/// Overlays `patch` onto `base`, descending into subdocuments present on both sides.
fn merge_into(base: &mut BsonDocument, patch: &BsonDocument) {
    for (k, v) in patch {
        if let (Some(Bson::Document(into)), Bson::Document(from)) = (base.get_mut(k), v) {
            merge_into(into, from);
            continue;
        }
        base.insert(k.clone(), v.clone());
    }
}
