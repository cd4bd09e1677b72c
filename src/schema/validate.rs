use bson::{Bson, Document as BsonDocument};

use super::core::Schema;
use super::types::{FieldDef, FieldType};
use crate::errors::DbError;
use crate::types::ID_FIELD;

pub(crate) const CREATED_AT: &str = "createdAt";
pub(crate) const UPDATED_AT: &str = "updatedAt";

pub(crate) fn prepare(schema: &Schema, data: &BsonDocument) -> Result<BsonDocument, DbError> {
    let mut out = BsonDocument::new();
    for (k, v) in data {
        if schema.get_virtual(k).is_some() {
            continue;
        }
        let keep = !schema.options.strict
            || k == ID_FIELD
            || schema.field_def(k).is_some()
            || (schema.options.timestamps && (k == CREATED_AT || k == UPDATED_AT));
        if keep {
            out.insert(k.clone(), v.clone());
        }
    }
    for (name, def) in schema.fields() {
        let present = out.get(name).filter(|v| !matches!(v, Bson::Null)).cloned();
        let value = match (present, &def.default) {
            (Some(v), _) => Some(cast(name, def.field_type, v)?),
            (None, Some(d)) => Some(cast(name, def.field_type, d.clone())?),
            (None, None) => None,
        };
        match value {
            Some(v) => {
                check(name, def, &v)?;
                out.insert(name.to_string(), v);
            }
            None if def.required => {
                return Err(DbError::validation(name, "path is required"));
            }
            None => {}
        }
    }
    Ok(out)
}

fn type_name(v: &Bson) -> &'static str {
    match v {
        Bson::String(_) => "string",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => "number",
        Bson::Boolean(_) => "boolean",
        Bson::DateTime(_) => "date",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Null => "null",
        _ => "value",
    }
}

/// Casts `v` to `ty` the way a loosely typed caller would expect.
pub(crate) fn cast(path: &str, ty: FieldType, v: Bson) -> Result<Bson, DbError> {
    let fail = |v: &Bson| DbError::validation(path, format!("cannot cast {} to {ty:?}", type_name(v)));
    Ok(match (ty, v) {
        (FieldType::Mixed, v) => v,
        (FieldType::String, Bson::String(s)) => Bson::String(s),
        (FieldType::String, Bson::Int32(i)) => Bson::String(i.to_string()),
        (FieldType::String, Bson::Int64(i)) => Bson::String(i.to_string()),
        (FieldType::String, Bson::Double(f)) => Bson::String(f.to_string()),
        (FieldType::String, Bson::Boolean(b)) => Bson::String(b.to_string()),
        (FieldType::Number, v @ (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))) => v,
        (FieldType::Number, Bson::String(s)) => {
            let t = s.trim();
            if let Ok(i) = t.parse::<i64>() {
                i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32)
            } else if let Ok(f) = t.parse::<f64>() {
                Bson::Double(f)
            } else {
                return Err(fail(&Bson::String(s)));
            }
        }
        (FieldType::Boolean, Bson::Boolean(b)) => Bson::Boolean(b),
        (FieldType::Boolean, Bson::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Bson::Boolean(true),
            "false" | "0" | "no" => Bson::Boolean(false),
            _ => return Err(fail(&Bson::String(s))),
        },
        (FieldType::Boolean, Bson::Int32(i @ (0 | 1))) => Bson::Boolean(i == 1),
        (FieldType::Date, Bson::DateTime(d)) => Bson::DateTime(d),
        (FieldType::Date, Bson::String(s)) => match chrono::DateTime::parse_from_rfc3339(&s) {
            Ok(dt) => Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())),
            Err(_) => return Err(fail(&Bson::String(s))),
        },
        (FieldType::Date, Bson::Int64(ms)) => Bson::DateTime(bson::DateTime::from_millis(ms)),
        (FieldType::Array, Bson::Array(a)) => Bson::Array(a),
        (FieldType::Array, v) => Bson::Array(vec![v]),
        (FieldType::Document, Bson::Document(d)) => Bson::Document(d),
        (_, v) => return Err(fail(&v)),
    })
}

fn as_number(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn check(path: &str, def: &FieldDef, v: &Bson) -> Result<(), DbError> {
    if let Some(n) = as_number(v) {
        if let Some(min) = def.min
            && n < min
        {
            return Err(DbError::validation(path, format!("{n} is less than minimum {min}")));
        }
        if let Some(max) = def.max
            && n > max
        {
            return Err(DbError::validation(path, format!("{n} is more than maximum {max}")));
        }
    }
    let len = match v {
        Bson::String(s) => Some(s.chars().count()),
        Bson::Array(a) => Some(a.len()),
        _ => None,
    };
    if let Some(len) = len {
        if def.min_length.is_some_and(|m| len < m) {
            return Err(DbError::validation(path, format!("length {len} is shorter than allowed")));
        }
        if def.max_length.is_some_and(|m| len > m) {
            return Err(DbError::validation(path, format!("length {len} is longer than allowed")));
        }
    }
    if !def.enum_values.is_empty() && !def.enum_values.contains(v) {
        return Err(DbError::validation(path, format!("{v} is not an allowed value")));
    }
    if let (Some(re), Bson::String(s)) = (&def.pattern, v)
        && !re.is_match(s)
    {
        return Err(DbError::validation(path, format!("`{s}` does not match {}", re.as_str())));
    }
    Ok(())
}
