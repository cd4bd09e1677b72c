use bson::{Bson, Document as BsonDocument};
use std::fmt;
use std::sync::Arc;

use super::types::DocumentState;
use crate::errors::DbError;
use crate::model::Model;
use crate::query::{get_path, remove_path};
use crate::schema::Schema;
use crate::types::{DocumentId, ID_FIELD};

/// A stored record bound to its model.
///
/// Field access goes through the schema first so virtual getters and setters
/// apply; everything else reads and writes `data` directly.
#[derive(Clone)]
pub struct Document {
    id: DocumentId,
    pub data: BsonDocument,
    model: Arc<Model>,
    pub(crate) state: DocumentState,
    /// Array paths that hold only a slice of the stored array.
    pub(crate) sliced: Vec<String>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("model", &self.model.name())
            .field("id", &self.id)
            .field("data", &self.data)
            .field("state", &self.state)
            .field("sliced", &self.sliced)
            .finish()
    }
}

impl Document {
    pub(crate) fn bind(model: Arc<Model>, id: DocumentId, mut data: BsonDocument, state: DocumentState) -> Self {
        if state == DocumentState::New {
            data.insert(ID_FIELD, Bson::from(&id));
        }
        Self { id, data, model, state, sliced: Vec::new() }
    }

    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        self.model.schema()
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state == DocumentState::New
    }

    /// Reads a path, computing it when the schema declares a virtual of that name.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Bson> {
        if let Some(v) = self.schema().get_virtual(path) {
            return v.getter.as_ref().map(|g| g(&self.data));
        }
        get_path(&self.data, path).cloned()
    }

    /// Writes a path, routing through a virtual setter when one exists.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for getter-only virtuals or writes to `_id`.
    pub fn set(&mut self, path: &str, value: impl Into<Bson>) -> Result<(), DbError> {
        let value = value.into();
        if path == ID_FIELD {
            return Err(DbError::validation(path, "the identity of a document cannot change"));
        }
        let model = Arc::clone(&self.model);
        if let Some(v) = model.schema().get_virtual(path) {
            let setter = v
                .setter
                .as_ref()
                .ok_or_else(|| DbError::validation(path, "virtual has no setter"))?;
            setter(&mut self.data, value)?;
        } else {
            set_path(&mut self.data, path, value);
        }
        // an overwritten array is no longer a fragment of the stored one
        self.sliced.retain(|s| !(s == path || s.starts_with(&format!("{path}."))));
        Ok(())
    }

    /// Invokes an instance method declared on the schema with this document as receiver.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchMethod` for unknown names, or whatever the method returns.
    pub fn call(&mut self, name: &str, args: &[Bson]) -> Result<Bson, DbError> {
        let model = Arc::clone(&self.model);
        let method = model
            .schema()
            .get_method(name)
            .ok_or_else(|| DbError::NoSuchMethod(format!("{}.{name}", model.name())))?;
        method(self, args)
    }

    /// Runs schema validation without writing.
    ///
    /// # Errors
    /// Returns the first `DbError::Validation` found.
    pub fn validate(&self) -> Result<(), DbError> {
        self.schema().validate(&self.data).map(|_| ())
    }

    /// Validates and writes the document, inserting it when new.
    ///
    /// A document loaded through a projection or slice is merged into the
    /// stored copy; sliced arrays keep their stored elements unless `set`.
    ///
    /// # Errors
    /// Returns `DbError::Validation` and leaves the store untouched when validation fails.
    pub fn save(&mut self) -> Result<(), DbError> {
        let model = Arc::clone(&self.model);
        self.data = model.save_document(&self.id, &self.data, self.state, &self.sliced)?;
        self.state = DocumentState::Loaded;
        self.sliced.clear();
        Ok(())
    }

    /// Deletes the stored copy. Returns whether anything was removed.
    pub fn remove(&self) -> bool {
        self.model.remove_by_id(&self.id)
    }

    /// Plain copy of the stored paths, optionally with computed virtuals.
    #[must_use]
    pub fn to_object(&self, with_virtuals: bool) -> BsonDocument {
        let mut out = self.data.clone();
        if with_virtuals {
            let schema = self.schema();
            let mut names: Vec<&str> = schema.virtual_names().collect();
            names.sort_unstable();
            for name in names {
                if let Some(g) = schema.get_virtual(name).and_then(|v| v.getter.as_ref()) {
                    out.insert(name, g(&self.data));
                }
            }
        }
        out
    }

    #[must_use]
    pub fn into_plain(self) -> BsonDocument {
        self.data
    }
}

fn ensure_subdoc<'a>(root: &'a mut BsonDocument, key: &str) -> &'a mut BsonDocument {
    if !matches!(root.get(key), Some(Bson::Document(_))) {
        root.insert(key.to_string(), Bson::Document(BsonDocument::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => d,
        _ => unreachable!("subdocument inserted above"),
    }
}

fn traverse_to_parent<'a>(root: &'a mut BsonDocument, path: &str) -> (&'a mut BsonDocument, String) {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    let mut last = String::new();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            last = seg.to_string();
            break;
        }
        cur = ensure_subdoc(cur, seg);
    }
    (cur, last)
}

/// Sets a dotted path, creating intermediate documents. Returns whether the value changed.
pub(crate) fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> bool {
    let (parent, last) = traverse_to_parent(root, path);
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

pub(crate) fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    remove_path(root, path)
}
