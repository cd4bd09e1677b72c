use bson::{Bson, Document as BsonDocument};
use regex::Regex;
use std::str::FromStr;
use std::sync::Arc;

use crate::document::Document;
use crate::errors::DbError;
use crate::model::Model;
use crate::query::Query;

pub type InstanceMethod = Arc<dyn Fn(&mut Document, &[Bson]) -> Result<Bson, DbError> + Send + Sync>;
pub type StaticMethod = Arc<dyn Fn(&Model, &[Bson]) -> Result<Bson, DbError> + Send + Sync>;
/// Query helpers record their own chain errors on the returned query.
pub type QueryHelper = Arc<dyn Fn(Query, &[Bson]) -> Query + Send + Sync>;
pub type VirtualGetter = Arc<dyn Fn(&BsonDocument) -> Bson + Send + Sync>;
pub type VirtualSetter = Arc<dyn Fn(&mut BsonDocument, Bson) -> Result<(), DbError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Document,
    Mixed,
}

impl FromStr for FieldType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "date" => Self::Date,
            "array" => Self::Array,
            "document" | "object" | "map" => Self::Document,
            "mixed" => Self::Mixed,
            other => return Err(DbError::Cast(format!("unknown field type `{other}`"))),
        })
    }
}

/// Declaration of one schema path.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Bson>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub enum_values: Vec<Bson>,
    pub pattern: Option<Regex>,
}

impl FieldDef {
    #[must_use]
    pub const fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            enum_values: Vec::new(),
            pattern: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, v: impl Into<Bson>) -> Self {
        self.default = Some(v.into());
        self
    }

    #[must_use]
    pub fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }

    #[must_use]
    pub fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }

    #[must_use]
    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    #[must_use]
    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    #[must_use]
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    /// Returns `DbError::Cast` if the pattern is not a valid regular expression.
    pub fn matches(mut self, pattern: &str) -> Result<Self, DbError> {
        let re = Regex::new(pattern).map_err(|e| DbError::Cast(format!("bad pattern `{pattern}`: {e}")))?;
        self.pattern = Some(re);
        Ok(self)
    }
}

/// A computed, never-persisted property.
#[derive(Clone, Default)]
pub struct VirtualField {
    pub getter: Option<VirtualGetter>,
    pub setter: Option<VirtualSetter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Drop paths the schema does not declare when writing.
    pub strict: bool,
    /// Maintain `createdAt` / `updatedAt`.
    pub timestamps: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self { strict: true, timestamps: false }
    }
}
