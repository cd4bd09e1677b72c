use bson::{Bson, Document as BsonDocument, doc};
use std::fmt;
use std::sync::Arc;

use super::cursor::Cursor;
use super::exec::Plan;
use super::parse::{build_regex, check_path, parse_filter};
use super::types::{Clause, Op, Projection, Slice, SortArg, SortSpec};
use crate::document::Document;
use crate::errors::DbError;
use crate::model::Model;

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Fluent query over one model.
///
/// Chain methods consume and return the query; the first error they hit is
/// kept and reported by the terminal call. A query executes once.
pub struct Query {
    model: Arc<Model>,
    clauses: Vec<Clause>,
    path: Option<String>,
    sort: Vec<SortSpec>,
    skip: usize,
    limit: Option<usize>,
    projection: Option<Projection>,
    slices: Vec<(String, Slice)>,
    executed: bool,
    error: Option<DbError>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model.name())
            .field("clauses", &self.clauses)
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("executed", &self.executed)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Query {
    #[must_use]
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            clauses: Vec::new(),
            path: None,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            projection: None,
            slices: Vec::new(),
            executed: false,
            error: None,
        }
    }

    #[must_use]
    pub const fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Current path set by `where_`.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Error recorded by an earlier chain call, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    #[must_use]
    pub const fn is_executed(&self) -> bool {
        self.executed
    }

    /// Records `err` unless an earlier error is already pending.
    #[must_use]
    pub fn fail(mut self, err: DbError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    fn chain<F>(mut self, method: &str, f: F) -> Self
    where
        F: FnOnce(&mut Self) -> Result<(), DbError>,
    {
        if self.executed {
            return self.fail(DbError::InvalidChain(format!("`{method}` called on an executed query")));
        }
        if self.error.is_some() {
            return self;
        }
        match f(&mut self) {
            Ok(()) => self,
            Err(e) => self.fail(e),
        }
    }

    fn current_path(&self, method: &str) -> Result<String, DbError> {
        self.path
            .clone()
            .ok_or_else(|| DbError::InvalidChain(format!("`{method}` needs a path; call `where_` first")))
    }

    fn push_op(self, method: &str, op: Op) -> Self {
        self.chain(method, |q| {
            let path = q.current_path(method)?;
            q.clauses.push(Clause { path, op });
            Ok(())
        })
    }

    /// Set operands beyond `max_in_set` are rejected rather than dropped.
    fn push_set<I, V>(self, method: &str, values: I, make: fn(Vec<Bson>) -> Op) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let vs: Vec<Bson> = values.into_iter().map(Into::into).collect();
        let cap = self.model.config().max_in_set;
        self.chain(method, |q| {
            if vs.len() > cap {
                return Err(DbError::QueryError(format!("`{method}` takes at most {cap} values, got {}", vs.len())));
            }
            let path = q.current_path(method)?;
            q.clauses.push(Clause { path, op: make(vs) });
            Ok(())
        })
    }

    /// Sets the path that following operators apply to.
    #[must_use]
    pub fn where_(self, path: &str) -> Self {
        self.chain("where_", |q| {
            check_path(path, q.model.config())?;
            q.path = Some(path.to_string());
            Ok(())
        })
    }

    /// `where_(path).equals(value)`.
    #[must_use]
    pub fn where_eq(self, path: &str, value: impl Into<Bson>) -> Self {
        self.where_(path).equals(value)
    }

    /// Merges a filter document such as `{"age": {"$gte": 18}}`.
    #[must_use]
    pub fn filter(self, filter: BsonDocument) -> Self {
        self.chain("filter", |q| {
            let parsed = parse_filter(&filter, q.model.config())?;
            q.clauses.extend(parsed);
            Ok(())
        })
    }

    #[must_use]
    pub fn equals(self, value: impl Into<Bson>) -> Self {
        self.push_op("equals", Op::Eq(value.into()))
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Bson>) -> Self {
        self.push_op("ne", Op::Ne(value.into()))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Bson>) -> Self {
        self.push_op("gt", Op::Gt(value.into()))
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Bson>) -> Self {
        self.push_op("gte", Op::Gte(value.into()))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Bson>) -> Self {
        self.push_op("lt", Op::Lt(value.into()))
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Bson>) -> Self {
        self.push_op("lte", Op::Lte(value.into()))
    }

    #[must_use]
    pub fn in_values<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.push_set("in_values", values, Op::In)
    }

    #[must_use]
    pub fn nin<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.push_set("nin", values, Op::Nin)
    }

    /// Every value must appear in the array at the current path.
    #[must_use]
    pub fn all<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.push_set("all", values, Op::All)
    }

    #[must_use]
    pub fn exists(self, present: bool) -> Self {
        self.push_op("exists", Op::Exists(present))
    }

    #[must_use]
    pub fn modulo(self, divisor: i64, remainder: i64) -> Self {
        self.push_op("modulo", Op::Mod { divisor, remainder })
    }

    /// Array at the current path has exactly `n` elements.
    #[must_use]
    pub fn size(self, n: usize) -> Self {
        self.push_op("size", Op::Size(n))
    }

    #[must_use]
    pub fn regex(self, pattern: &str) -> Self {
        self.regex_with(pattern, "")
    }

    /// Options: `i`, `m`, `s`, `x`.
    #[must_use]
    pub fn regex_with(self, pattern: &str, options: &str) -> Self {
        match build_regex(pattern, options) {
            Ok(re) => self.push_op("regex", Op::Regex(re)),
            Err(e) => self.chain("regex", |_| Err(e)),
        }
    }

    fn push_slice(self, method: &str, slice: Slice) -> Self {
        self.chain(method, |q| {
            let path = q.current_path(method)?;
            if slice.skip.is_some() && slice.count <= 0 {
                return Err(DbError::QueryError(format!("`{method}` needs a positive count")));
            }
            q.clauses.push(Clause { path: path.clone(), op: Op::IsArray });
            q.slices.retain(|(p, _)| *p != path);
            q.slices.push((path, slice));
            Ok(())
        })
    }

    /// Returns only the first `n` elements of the array (last `-n` when negative).
    /// Documents without an array at the path are excluded.
    #[must_use]
    pub fn slice(self, n: i64) -> Self {
        self.push_slice("slice", Slice { skip: None, count: n })
    }

    /// Returns `n` elements after skipping `skip`; a negative skip counts from the end.
    #[must_use]
    pub fn slice_range(self, skip: i64, n: i64) -> Self {
        self.push_slice("slice_range", Slice { skip: Some(skip), count: n })
    }

    /// Adds sort keys. A key already present keeps its slot with the new direction.
    #[must_use]
    pub fn sort(self, arg: impl Into<SortArg>) -> Self {
        let arg = arg.into();
        self.chain("sort", |q| {
            for spec in arg.into_specs()? {
                match q.sort.iter_mut().find(|s| s.field == spec.field) {
                    Some(existing) => existing.order = spec.order,
                    None => q.sort.push(spec),
                }
            }
            let max = q.model.config().max_sort_fields;
            if q.sort.len() > max {
                log::warn!("{}: sort spec too long ({}), keeping {max} keys", q.model.name(), q.sort.len());
                q.sort.truncate(max);
            }
            Ok(())
        })
    }

    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        self.chain("skip", |q| {
            q.skip = n;
            Ok(())
        })
    }

    /// Clamped to `max_limit`. `limit(0)` yields nothing.
    #[must_use]
    pub fn limit(self, n: usize) -> Self {
        self.chain("limit", |q| {
            let max = q.model.config().max_limit;
            if n > max {
                log::warn!("{}: limit {n} clamped to {max}", q.model.name());
            }
            q.limit = Some(n.min(max));
            Ok(())
        })
    }

    /// `"a b"` keeps those fields (plus `_id`); `"-c -d"` drops them. Mixing is an error.
    #[must_use]
    pub fn select(self, spec: &str) -> Self {
        self.chain("select", |q| {
            let (excluded, included): (Vec<&str>, Vec<&str>) =
                spec.split_whitespace().partition(|t| t.starts_with('-'));
            let projection = match (included.is_empty(), excluded.is_empty()) {
                (true, true) => return Ok(()),
                (false, true) => Projection::Include(included.iter().map(|s| (*s).to_string()).collect()),
                (true, false) => {
                    Projection::Exclude(excluded.iter().map(|s| s[1..].to_string()).collect())
                }
                (false, false) => {
                    return Err(DbError::QueryError(format!(
                        "select `{spec}` mixes inclusion and exclusion"
                    )));
                }
            };
            for field in match &projection {
                Projection::Include(f) | Projection::Exclude(f) => f,
            } {
                check_path(field, q.model.config())?;
            }
            q.projection = Some(projection);
            Ok(())
        })
    }

    /// Invokes a query helper declared on the schema.
    #[must_use]
    pub fn helper(self, name: &str, args: &[Bson]) -> Self {
        if self.executed {
            return self.fail(DbError::InvalidChain(format!("`{name}` called on an executed query")));
        }
        let model = Arc::clone(&self.model);
        match model.schema().get_query_helper(name) {
            Some(h) => h(self, args),
            None => self.fail(DbError::NoSuchMethod(format!("{}.query.{name}", model.name()))),
        }
    }

    fn plan(&self) -> Plan {
        Plan {
            model: Arc::clone(&self.model),
            clauses: self.clauses.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            projection: self.projection.clone(),
            slices: self.slices.clone(),
        }
    }

    /// Describes how the query would run, without running it.
    #[must_use]
    pub fn explain(&self) -> BsonDocument {
        let one = |c: &Clause| {
            let mut ops = BsonDocument::new();
            ops.insert(c.op.name(), c.op.operand());
            ops
        };
        let mut filter = BsonDocument::new();
        for c in &self.clauses {
            match filter.get_mut(&c.path) {
                Some(Bson::Document(ops)) if !ops.contains_key(c.op.name()) => {
                    ops.insert(c.op.name(), c.op.operand());
                }
                Some(_) => {
                    // an operator repeats on one path: list every clause instead
                    let all = self
                        .clauses
                        .iter()
                        .map(|c| {
                            let mut d = BsonDocument::new();
                            d.insert(c.path.clone(), one(c));
                            Bson::Document(d)
                        })
                        .collect::<Vec<_>>();
                    filter = doc! {"$and": all};
                    break;
                }
                None => {
                    filter.insert(c.path.clone(), one(c));
                }
            }
        }
        let sort: BsonDocument =
            self.sort.iter().map(|s| (s.field.clone(), Bson::Int32(s.order.as_i32()))).collect();
        let projection = self.projection.as_ref().map_or(Bson::Null, |p| {
            let (fields, flag) = match p {
                Projection::Include(f) => (f, 1),
                Projection::Exclude(f) => (f, 0),
            };
            Bson::Document(fields.iter().map(|f| (f.clone(), Bson::Int32(flag))).collect())
        });
        let slices: BsonDocument = self
            .slices
            .iter()
            .map(|(p, s)| {
                let v = match s.skip {
                    Some(skip) => Bson::Array(vec![Bson::Int64(skip), Bson::Int64(s.count)]),
                    None => Bson::Int64(s.count),
                };
                (p.clone(), v)
            })
            .collect();
        let limit = self.limit.map_or(Bson::Null, |l| Bson::Int64(as_i64(l)));
        let strategy = if self.sort.is_empty() { "scan" } else { "sorted" };
        doc! {
            "collection": self.model.name(),
            "strategy": strategy,
            "filter": filter,
            "sort": sort,
            "skip": as_i64(self.skip),
            "limit": limit,
            "projection": projection,
            "slice": slices,
            "executed": self.executed,
        }
    }

    /// Marks the query executed and surfaces any recorded chain error.
    fn resolve(&mut self, method: &str) -> Result<Plan, DbError> {
        if self.executed {
            return Err(DbError::InvalidChain(format!("`{method}` called on an executed query")));
        }
        self.executed = true;
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        Ok(self.plan())
    }

    /// # Errors
    /// Returns the first recorded chain error, or `DbError::InvalidChain` if already executed.
    pub fn exec(&mut self) -> Result<Vec<Document>, DbError> {
        Ok(self.resolve("exec")?.run())
    }

    /// Plain documents: no model binding, no virtuals.
    ///
    /// # Errors
    /// Same as [`Query::exec`].
    pub fn lean(&mut self) -> Result<Vec<BsonDocument>, DbError> {
        Ok(self.resolve("lean")?.run_lean())
    }

    /// # Errors
    /// Same as [`Query::exec`].
    pub fn exec_one(&mut self) -> Result<Option<Document>, DbError> {
        let mut plan = self.resolve("exec_one")?;
        plan.limit = Some(plan.limit.map_or(1, |l| l.min(1)));
        Ok(plan.run().into_iter().next())
    }

    /// Number of matches; skip, limit and sort do not apply.
    ///
    /// # Errors
    /// Same as [`Query::exec`].
    pub fn count(&mut self) -> Result<usize, DbError> {
        Ok(self.resolve("count")?.count())
    }

    /// # Errors
    /// Same as [`Query::exec`].
    pub fn cursor(&mut self) -> Result<Cursor, DbError> {
        let plan = self.resolve("cursor")?;
        log::debug!("{}: cursor opened ({})", plan.model.name(), plan.strategy());
        Ok(plan.open())
    }

    /// Runs the scan on tokio's blocking pool.
    ///
    /// # Errors
    /// Same as [`Query::exec`], or `DbError::QueryError` if the worker task fails.
    pub async fn exec_async(&mut self) -> Result<Vec<Document>, DbError> {
        let plan = self.resolve("exec_async")?;
        tokio::task::spawn_blocking(move || plan.run())
            .await
            .map_err(|e| DbError::QueryError(format!("query task failed: {e}")))
    }

    /// Callback form of [`Query::exec`]; errors are delivered to the callback.
    pub fn exec_with<F>(&mut self, callback: F)
    where
        F: FnOnce(Result<Vec<Document>, DbError>),
    {
        callback(self.exec());
    }
}
