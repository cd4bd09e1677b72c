use bson::{Bson, Document as BsonDocument};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::DbError;

// Hard cap on dotted path length during evaluation.
pub(crate) const MAX_PATH_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Normalizes `1`, `-1`, `"asc"`, `"desc"`, `"ascending"`, `"descending"`.
    ///
    /// # Errors
    /// Returns `DbError::QueryError` for any other value.
    pub fn parse(v: &Bson) -> Result<Self, DbError> {
        match v {
            Bson::Int32(1) | Bson::Int64(1) => Ok(Self::Asc),
            Bson::Int32(-1) | Bson::Int64(-1) => Ok(Self::Desc),
            Bson::Double(f) if *f == 1.0 => Ok(Self::Asc),
            Bson::Double(f) if *f == -1.0 => Ok(Self::Desc),
            Bson::String(s) => s.parse(),
            other => Err(DbError::QueryError(format!("invalid sort direction: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

impl FromStr for Order {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            _ => Err(DbError::QueryError(format!("invalid sort direction: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    #[must_use]
    pub fn new(field: &str, order: Order) -> Self {
        Self { field: field.to_string(), order }
    }
}

/// Input accepted by `Query::sort`.
#[derive(Debug, Clone)]
pub enum SortArg {
    /// `"-hits name"`: a leading `-` marks descending, `+` or nothing ascending.
    Shorthand(String),
    /// `{field: direction}` in insertion order.
    Mapping(BsonDocument),
    Specs(Vec<SortSpec>),
}

impl SortArg {
    /// # Errors
    /// Returns `DbError::QueryError` for empty keys or unknown directions.
    pub fn into_specs(self) -> Result<Vec<SortSpec>, DbError> {
        match self {
            Self::Shorthand(s) => s
                .split_whitespace()
                .map(|tok| {
                    let (field, order) = match tok.strip_prefix('-') {
                        Some(f) => (f, Order::Desc),
                        None => (tok.strip_prefix('+').unwrap_or(tok), Order::Asc),
                    };
                    if field.is_empty() {
                        return Err(DbError::QueryError(format!("invalid sort key `{tok}`")));
                    }
                    Ok(SortSpec::new(field, order))
                })
                .collect(),
            Self::Mapping(doc) => {
                doc.iter().map(|(k, v)| Ok(SortSpec::new(k, Order::parse(v)?))).collect()
            }
            Self::Specs(v) => Ok(v),
        }
    }
}

impl From<&str> for SortArg {
    fn from(s: &str) -> Self {
        Self::Shorthand(s.to_string())
    }
}

impl From<String> for SortArg {
    fn from(s: String) -> Self {
        Self::Shorthand(s)
    }
}

impl From<BsonDocument> for SortArg {
    fn from(d: BsonDocument) -> Self {
        Self::Mapping(d)
    }
}

impl From<Vec<SortSpec>> for SortArg {
    fn from(v: Vec<SortSpec>) -> Self {
        Self::Specs(v)
    }
}

#[derive(Debug, Clone)]
pub enum Op {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
    Mod { divisor: i64, remainder: i64 },
    Size(usize),
    Regex(Regex),
    All(Vec<Bson>),
    IsArray,
}

impl Op {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Eq(_) => "$eq",
            Self::Ne(_) => "$ne",
            Self::Gt(_) => "$gt",
            Self::Gte(_) => "$gte",
            Self::Lt(_) => "$lt",
            Self::Lte(_) => "$lte",
            Self::In(_) => "$in",
            Self::Nin(_) => "$nin",
            Self::Exists(_) => "$exists",
            Self::Mod { .. } => "$mod",
            Self::Size(_) => "$size",
            Self::Regex(_) => "$regex",
            Self::All(_) => "$all",
            Self::IsArray => "$isArray",
        }
    }

    /// Operand as it appears in a filter document.
    #[must_use]
    pub fn operand(&self) -> Bson {
        match self {
            Self::Eq(v) | Self::Ne(v) | Self::Gt(v) | Self::Gte(v) | Self::Lt(v) | Self::Lte(v) => {
                v.clone()
            }
            Self::In(vs) | Self::Nin(vs) | Self::All(vs) => Bson::Array(vs.clone()),
            Self::Exists(b) => Bson::Boolean(*b),
            Self::Mod { divisor, remainder } => {
                Bson::Array(vec![Bson::Int64(*divisor), Bson::Int64(*remainder)])
            }
            Self::Size(n) => Bson::Int64(i64::try_from(*n).unwrap_or(i64::MAX)),
            Self::Regex(re) => Bson::String(re.as_str().to_string()),
            Self::IsArray => Bson::Boolean(true),
        }
    }
}

/// One predicate: `path op operand`.
#[derive(Debug, Clone)]
pub struct Clause {
    pub path: String,
    pub op: Op,
}

/// `$slice` projection on an array path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// Elements to skip; negative counts from the end.
    pub skip: Option<i64>,
    /// Elements to keep; negative without `skip` keeps the last `n`.
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Default, Clone)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    /// Operands are always `Int32`, `Int64` or `Double`.
    pub inc: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn direction_spellings_normalize() {
        for v in [Bson::Int32(1), "asc".into(), "ascending".into(), "ASC".into()] {
            assert_eq!(Order::parse(&v).unwrap(), Order::Asc);
        }
        for v in [Bson::Int32(-1), "desc".into(), "descending".into(), Bson::Int64(-1)] {
            assert_eq!(Order::parse(&v).unwrap(), Order::Desc);
        }
        assert!(Order::parse(&Bson::Int32(2)).is_err());
        assert!(Order::parse(&"sideways".into()).is_err());
    }

    #[test]
    fn shorthand_and_mapping_agree() {
        let a = SortArg::from("-hits name").into_specs().unwrap();
        let b = SortArg::from(doc! {"hits": "desc", "name": 1}).into_specs().unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], SortSpec::new("hits", Order::Desc));
    }

    #[test]
    fn bare_dash_is_rejected() {
        assert!(SortArg::from("- name").into_specs().is_err());
    }
}
