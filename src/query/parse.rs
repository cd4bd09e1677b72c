use bson::{Bson, Document as BsonDocument};
use regex::{Regex, RegexBuilder};

use super::types::{Clause, Op, UpdateDoc};
use crate::config::OdmConfig;
use crate::errors::DbError;

pub(crate) fn check_path(path: &str, cfg: &OdmConfig) -> Result<(), DbError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(DbError::QueryError(format!("invalid path `{path}`")));
    }
    if path.split('.').count() > cfg.max_path_depth {
        return Err(DbError::QueryError(format!("path `{path}` is nested too deeply")));
    }
    Ok(())
}

/// Compiles a pattern with `$options` flags `i`, `m`, `s`, `x`.
pub(crate) fn build_regex(pattern: &str, options: &str) -> Result<Regex, DbError> {
    let mut b = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => b.case_insensitive(true),
            'm' => b.multi_line(true),
            's' => b.dot_matches_new_line(true),
            'x' => b.ignore_whitespace(true),
            other => return Err(DbError::QueryError(format!("unsupported regex option `{other}`"))),
        };
    }
    b.build().map_err(|e| DbError::QueryError(format!("bad regex `{pattern}`: {e}")))
}

#[allow(clippy::cast_possible_truncation)]
fn as_count(op: &str, v: &Bson) -> Result<i64, DbError> {
    match v {
        Bson::Int32(i) => Ok(i64::from(*i)),
        Bson::Int64(i) => Ok(*i),
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        other => Err(DbError::QueryError(format!("{op} expects an integer, got {other}"))),
    }
}

fn as_list(op: &str, v: &Bson, cfg: &OdmConfig) -> Result<Vec<Bson>, DbError> {
    match v {
        Bson::Array(items) if items.len() > cfg.max_in_set => Err(DbError::QueryError(format!(
            "{op} takes at most {} values, got {}",
            cfg.max_in_set,
            items.len()
        ))),
        Bson::Array(items) => Ok(items.clone()),
        other => Err(DbError::QueryError(format!("{op} expects an array, got {other}"))),
    }
}

fn is_operator_doc(d: &BsonDocument) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

fn parse_operators(path: &str, ops: &BsonDocument, cfg: &OdmConfig, out: &mut Vec<Clause>) -> Result<(), DbError> {
    let options = match ops.get("$options") {
        Some(Bson::String(s)) => s.as_str(),
        Some(other) => return Err(DbError::QueryError(format!("$options expects a string, got {other}"))),
        None => "",
    };
    for (key, v) in ops {
        let op = match key.as_str() {
            "$eq" => Op::Eq(v.clone()),
            "$ne" => Op::Ne(v.clone()),
            "$gt" => Op::Gt(v.clone()),
            "$gte" => Op::Gte(v.clone()),
            "$lt" => Op::Lt(v.clone()),
            "$lte" => Op::Lte(v.clone()),
            "$in" => Op::In(as_list(key, v, cfg)?),
            "$nin" => Op::Nin(as_list(key, v, cfg)?),
            "$all" => Op::All(as_list(key, v, cfg)?),
            "$exists" => match v {
                Bson::Boolean(b) => Op::Exists(*b),
                other => Op::Exists(as_count(key, other)? != 0),
            },
            "$size" => {
                let n = as_count(key, v)?;
                Op::Size(usize::try_from(n).map_err(|_| DbError::QueryError("$size must be non-negative".into()))?)
            }
            "$mod" => match v {
                Bson::Array(pair) if pair.len() == 2 => {
                    Op::Mod { divisor: as_count(key, &pair[0])?, remainder: as_count(key, &pair[1])? }
                }
                _ => return Err(DbError::QueryError("$mod expects [divisor, remainder]".into())),
            },
            "$regex" => match v {
                Bson::String(p) => Op::Regex(build_regex(p, options)?),
                other => return Err(DbError::QueryError(format!("$regex expects a string, got {other}"))),
            },
            "$options" => continue,
            other => return Err(DbError::QueryError(format!("unsupported operator `{other}`"))),
        };
        out.push(Clause { path: path.to_string(), op });
    }
    Ok(())
}

/// Parses a filter document (`{"age": {"$gte": 18}, "name": "ann", "$and": [...]}`) into AND-ed clauses.
///
/// # Errors
/// Returns `DbError::QueryError` on unknown operators, malformed operands or invalid paths.
pub fn parse_filter(filter: &BsonDocument, cfg: &OdmConfig) -> Result<Vec<Clause>, DbError> {
    let mut out = Vec::new();
    parse_into(filter, cfg, &mut out)?;
    Ok(out)
}

fn parse_into(filter: &BsonDocument, cfg: &OdmConfig, out: &mut Vec<Clause>) -> Result<(), DbError> {
    for (key, v) in filter {
        if key == "$and" {
            let Bson::Array(parts) = v else {
                return Err(DbError::QueryError("$and expects an array".into()));
            };
            for p in parts {
                match p {
                    Bson::Document(d) => parse_into(d, cfg, out)?,
                    other => return Err(DbError::QueryError(format!("$and entries must be documents, got {other}"))),
                }
            }
            continue;
        }
        if key.starts_with('$') {
            return Err(DbError::QueryError(format!("unsupported top-level operator `{key}`")));
        }
        check_path(key, cfg)?;
        match v {
            Bson::Document(ops) if is_operator_doc(ops) => parse_operators(key, ops, cfg, out)?,
            other => out.push(Clause { path: key.clone(), op: Op::Eq(other.clone()) }),
        }
    }
    Ok(())
}

/// # Errors
/// Returns an error if the JSON is malformed or describes an invalid filter.
pub fn parse_filter_json(json: &str, cfg: &OdmConfig) -> Result<Vec<Clause>, DbError> {
    let doc = crate::json::parse_json_to_bson_document(json)?;
    parse_filter(&doc, cfg)
}

fn operator_body<'a>(op: &str, v: &'a Bson) -> Result<&'a BsonDocument, DbError> {
    match v {
        Bson::Document(d) => Ok(d),
        other => Err(DbError::QueryError(format!("{op} expects a document, got {other}"))),
    }
}

/// Parses `{"$set": {...}, "$inc": {...}, "$unset": {...}}`. A document without
/// operators is treated as `$set` of all its fields.
///
/// # Errors
/// Returns an error for unknown operators or non-numeric `$inc` values.
pub fn parse_update(update: &BsonDocument) -> Result<UpdateDoc, DbError> {
    if !update.keys().any(|k| k.starts_with('$')) {
        return Ok(UpdateDoc { set: update.clone().into_iter().collect(), ..UpdateDoc::default() });
    }
    let mut out = UpdateDoc::default();
    for (op, v) in update {
        let body = operator_body(op, v)?;
        match op.as_str() {
            "$set" => out.set.extend(body.iter().take(128).map(|(k, v)| (k.clone(), v.clone()))),
            "$inc" => {
                for (k, v) in body.iter().take(128) {
                    if !matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                        return Err(DbError::QueryError("$inc requires numeric".into()));
                    }
                    out.inc.push((k.clone(), v.clone()));
                }
            }
            "$unset" => out.unset.extend(body.keys().take(128).cloned()),
            other => return Err(DbError::QueryError(format!("unsupported update operator `{other}`"))),
        }
    }
    Ok(out)
}
