use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::types::{Clause, MAX_PATH_DEPTH, Op, Order, Projection, Slice, SortSpec};
use crate::types::ID_FIELD;

/// Logical AND over all clauses; an empty list matches everything.
#[must_use]
pub fn eval_clauses(doc: &BsonDocument, clauses: &[Clause]) -> bool {
    clauses.iter().all(|c| eval_clause(doc, c))
}

#[must_use]
pub fn eval_clause(doc: &BsonDocument, clause: &Clause) -> bool {
    let field = get_path(doc, &clause.path);
    match &clause.op {
        Op::Eq(v) => eq_or_null(field, v),
        Op::Ne(v) => !eq_or_null(field, v),
        Op::Gt(v) => field.is_some_and(|f| any_cmp(f, v, |o| o == Ordering::Greater)),
        Op::Gte(v) => field.is_some_and(|f| any_cmp(f, v, |o| o != Ordering::Less)),
        Op::Lt(v) => field.is_some_and(|f| any_cmp(f, v, |o| o == Ordering::Less)),
        Op::Lte(v) => field.is_some_and(|f| any_cmp(f, v, |o| o != Ordering::Greater)),
        Op::In(set) => field.is_some_and(|f| set.iter().any(|v| matches_eq(f, v))),
        Op::Nin(set) => !field.is_some_and(|f| set.iter().any(|v| matches_eq(f, v))),
        Op::Exists(b) => field.is_some() == *b,
        Op::Mod { divisor, remainder } => {
            let hit = |x: &Bson| as_i64(x).and_then(|n| n.checked_rem(*divisor)) == Some(*remainder);
            *divisor != 0 && field.is_some_and(|f| any_elem(f, hit))
        }
        Op::Size(n) => matches!(field, Some(Bson::Array(a)) if a.len() == *n),
        Op::Regex(re) => {
            field.is_some_and(|f| any_elem(f, |x| matches!(x, Bson::String(s) if re.is_match(s))))
        }
        Op::All(vals) => match field {
            Some(Bson::Array(items)) => {
                !vals.is_empty() && vals.iter().all(|v| items.iter().any(|i| values_equal(i, v)))
            }
            _ => false,
        },
        Op::IsArray => matches!(field, Some(Bson::Array(_))),
    }
}

/// A missing path equals `null`.
fn eq_or_null(field: Option<&Bson>, operand: &Bson) -> bool {
    field.map_or(matches!(operand, Bson::Null), |f| matches_eq(f, operand))
}

/// Scalar operands match an array field when any element matches.
fn matches_eq(field: &Bson, operand: &Bson) -> bool {
    if values_equal(field, operand) {
        return true;
    }
    match (field, operand) {
        (Bson::Array(items), op) if !matches!(op, Bson::Array(_)) => {
            items.iter().any(|i| values_equal(i, op))
        }
        _ => false,
    }
}

fn any_elem<F: Fn(&Bson) -> bool>(field: &Bson, pred: F) -> bool {
    match field {
        Bson::Array(items) => items.iter().any(&pred),
        other => pred(other),
    }
}

/// Range comparisons only hold between values of the same type class.
fn any_cmp<F: Fn(Ordering) -> bool>(field: &Bson, operand: &Bson, want: F) -> bool {
    any_elem(field, |x| comparable(x, operand) && want(compare_bson(x, operand)))
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b))
        || matches!(
            (a, b),
            (Bson::String(_), Bson::String(_))
                | (Bson::Boolean(_), Bson::Boolean(_))
                | (Bson::DateTime(_), Bson::DateTime(_))
        )
}

#[must_use]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return compare_bson(a, b) == Ordering::Equal;
    }
    a == b
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_i64(x: &Bson) -> Option<i64> {
    match x {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) if f.is_finite() => Some(f.trunc() as i64),
        _ => None,
    }
}

pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Total order over BSON values: numbers numerically, then by type rank.
#[must_use]
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            return as_i64(a).cmp(&as_i64(b));
        }
        _ if is_num(a) && is_num(b) => return as_f64_num(a).total_cmp(&as_f64_num(b)),
        _ => {}
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let o = compare_bson(l, r);
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

/// Sort key for one document; `None` marks a missing path.
#[must_use]
pub fn sort_key(doc: &BsonDocument, sort: &[SortSpec]) -> Vec<Option<Bson>> {
    sort.iter().map(|s| get_path(doc, &s.field).cloned()).collect()
}

/// Missing values sort before present ones in ascending order.
#[must_use]
pub fn compare_keys(a: &[Option<Bson>], b: &[Option<Bson>], sort: &[SortSpec]) -> Ordering {
    for ((va, vb), s) in a.iter().zip(b).zip(sort) {
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[must_use]
pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    compare_keys(&sort_key(a, sort), &sort_key(b, sort), sort)
}

fn descend<'a>(cur: &'a mut Bson, part: &str) -> Option<&'a mut Bson> {
    match cur {
        Bson::Document(d) => d.get_mut(part),
        Bson::Array(items) => items.get_mut(part.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Mutable counterpart of [`get_path`]; never creates anything.
pub(crate) fn get_path_mut<'a>(doc: &'a mut BsonDocument, path: &str) -> Option<&'a mut Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let mut cur = doc.get_mut(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        cur = descend(cur, part)?;
    }
    Some(cur)
}

/// Removes the value at a dotted path. Returns whether anything was removed.
pub(crate) fn remove_path(doc: &mut BsonDocument, path: &str) -> bool {
    match path.rsplit_once('.') {
        None => doc.remove(path).is_some(),
        Some((parent, last)) => match get_path_mut(doc, parent) {
            Some(Bson::Document(d)) => d.remove(last).is_some(),
            _ => false,
        },
    }
}

/// Copies `path` from `src` into `dst`, rebuilding the enclosing documents.
fn copy_path(src: &BsonDocument, dst: &mut BsonDocument, path: &str) {
    let Some((head, rest)) = path.split_once('.') else {
        if let Some(v) = src.get(path) {
            dst.insert(path, v.clone());
        }
        return;
    };
    let Some(Bson::Document(inner)) = src.get(head) else {
        return;
    };
    if !dst.contains_key(head) {
        dst.insert(head, BsonDocument::new());
    }
    if let Some(Bson::Document(out)) = dst.get_mut(head) {
        copy_path(inner, out, rest);
    }
}

/// Applies an include/exclude projection; `_id` is kept unless excluded.
#[must_use]
pub fn project(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    match projection {
        Projection::Include(fields) => {
            let mut out = BsonDocument::new();
            if let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD, id.clone());
            }
            for f in fields {
                copy_path(doc, &mut out, f);
            }
            out
        }
        Projection::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                remove_path(&mut out, f);
            }
            out
        }
    }
}

/// Narrows the array at `path` in place. Non-array values are left untouched.
pub fn apply_slice(doc: &mut BsonDocument, path: &str, slice: Slice) {
    let Some(Bson::Array(items)) = get_path_mut(doc, path) else {
        return;
    };
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let (start, count) = match slice.skip {
        Some(skip) if skip < 0 => (len.saturating_add(skip).max(0), slice.count.max(0)),
        Some(skip) => (skip.min(len), slice.count.max(0)),
        None if slice.count < 0 => (len.saturating_add(slice.count).max(0), slice.count.saturating_neg()),
        None => (0, slice.count),
    };
    let end = start.saturating_add(count).min(len);
    let (start, end) = (usize::try_from(start).unwrap_or(0), usize::try_from(end).unwrap_or(0));
    *items = if start < end { items[start..end].to_vec() } else { Vec::new() };
}
