use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::types::{
    FieldDef, InstanceMethod, QueryHelper, SchemaOptions, StaticMethod, VirtualField,
};
use crate::document::Document;
use crate::errors::DbError;
use crate::model::Model;
use crate::query::Query;

/// Declarative shape and behaviour of a collection.
///
/// Behaviour tables are filled at definition time; documents, models and
/// queries look entries up by name when they are invoked.
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldDef)>,
    methods: HashMap<String, InstanceMethod>,
    statics: HashMap<String, StaticMethod>,
    helpers: HashMap<String, QueryHelper>,
    virtuals: HashMap<String, VirtualField>,
    pub options: SchemaOptions,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("virtuals", &self.virtuals.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares (or redeclares) a path.
    #[must_use]
    pub fn field(mut self, name: &str, def: FieldDef) -> Self {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = def;
        } else {
            self.fields.push((name.to_string(), def));
        }
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    #[must_use]
    pub fn timestamps(mut self, on: bool) -> Self {
        self.options.timestamps = on;
        self
    }

    #[must_use]
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Document, &[Bson]) -> Result<Bson, DbError> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn static_fn<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Model, &[Bson]) -> Result<Bson, DbError> + Send + Sync + 'static,
    {
        self.statics.insert(name.to_string(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn query_helper<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Query, &[Bson]) -> Query + Send + Sync + 'static,
    {
        self.helpers.insert(name.to_string(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn virtual_get<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&BsonDocument) -> Bson + Send + Sync + 'static,
    {
        self.virtuals.entry(name.to_string()).or_default().getter = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn virtual_set<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut BsonDocument, Bson) -> Result<(), DbError> + Send + Sync + 'static,
    {
        self.virtuals.entry(name.to_string()).or_default().setter = Some(Arc::new(f));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(n, d)| (n.as_str(), d))
    }

    #[must_use]
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    #[must_use]
    pub fn get_method(&self, name: &str) -> Option<&InstanceMethod> {
        self.methods.get(name)
    }

    #[must_use]
    pub fn get_static(&self, name: &str) -> Option<&StaticMethod> {
        self.statics.get(name)
    }

    #[must_use]
    pub fn get_query_helper(&self, name: &str) -> Option<&QueryHelper> {
        self.helpers.get(name)
    }

    #[must_use]
    pub fn get_virtual(&self, name: &str) -> Option<&VirtualField> {
        self.virtuals.get(name)
    }

    pub fn virtual_names(&self) -> impl Iterator<Item = &str> {
        self.virtuals.keys().map(String::as_str)
    }

    /// Applies defaults, casts, and validators; returns the document to persist.
    ///
    /// # Errors
    /// Returns `DbError::Validation` naming the first failing path.
    pub fn validate(&self, data: &BsonDocument) -> Result<BsonDocument, DbError> {
        super::validate::prepare(self, data)
    }
}
