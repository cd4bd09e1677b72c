use serde::Deserialize;
use serde_json::Value;

use super::core::Schema;
use super::types::{FieldDef, FieldType};
use crate::errors::DbError;
use crate::json::json_value_to_bson;

/// Long form of a path declaration: `{"type": "Number", "required": true, ...}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct FieldDeclSerde {
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<Value>,
    min: Option<f64>,
    max: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    #[serde(default, rename = "enum")]
    enum_values: Vec<Value>,
    #[serde(rename = "match")]
    pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldSerde {
    Short(String),
    ArrayOf(Vec<Value>),
    Long(FieldDeclSerde),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SchemaOptionsSerde {
    strict: Option<bool>,
    timestamps: Option<bool>,
}

impl TryFrom<FieldSerde> for FieldDef {
    type Error = DbError;

    fn try_from(fs: FieldSerde) -> Result<Self, Self::Error> {
        Ok(match fs {
            FieldSerde::Short(t) => Self::new(t.parse()?),
            FieldSerde::ArrayOf(_) => Self::new(FieldType::Array),
            FieldSerde::Long(d) => {
                let mut def = Self::new(d.field_type.parse()?);
                def.required = d.required;
                def.default = d.default.map(json_value_to_bson).transpose()?;
                def.min = d.min;
                def.max = d.max;
                def.min_length = d.min_length;
                def.max_length = d.max_length;
                def.enum_values =
                    d.enum_values.into_iter().map(json_value_to_bson).collect::<Result<_, _>>()?;
                if let Some(p) = d.pattern {
                    def = def.matches(&p)?;
                }
                def
            }
        })
    }
}

impl Schema {
    /// Parses a declaration object: `{"name": "String", "age": {"type": "Number", "min": 0}, "tags": ["String"]}`.
    /// An optional `"$options": {"strict": bool, "timestamps": bool}` entry sets schema options.
    ///
    /// # Errors
    /// Returns `DbError::Json` on malformed input and `DbError::Cast` on unknown types or bad patterns.
    pub fn from_json(json: &str) -> Result<Self, DbError> {
        let mut raw: serde_json::Map<String, Value> = serde_json::from_str(json)?;
        let opts: SchemaOptionsSerde = match raw.remove("$options") {
            Some(v) => serde_json::from_value(v)?,
            None => SchemaOptionsSerde::default(),
        };
        let mut schema = Self::new();
        for (name, v) in raw {
            let fs: FieldSerde = serde_json::from_value(v)?;
            schema = schema.field(&name, FieldDef::try_from(fs)?);
        }
        if let Some(s) = opts.strict {
            schema = schema.strict(s);
        }
        if let Some(t) = opts.timestamps {
            schema = schema.timestamps(t);
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    #[test]
    fn parses_short_long_and_array_forms() {
        let s = Schema::from_json(
            r#"{
                "name": "String",
                "hits": {"type": "Number", "required": true, "default": 0, "min": 0},
                "role": {"type": "String", "enum": ["user", "admin"], "match": "^[a-z]+$"},
                "projects": ["String"],
                "$options": {"timestamps": true}
            }"#,
        )
        .unwrap();
        assert_eq!(s.field_def("name").unwrap().field_type, FieldType::String);
        let hits = s.field_def("hits").unwrap();
        assert!(hits.required);
        assert!(matches!(hits.default, Some(Bson::Int32(0) | Bson::Int64(0))));
        assert_eq!(s.field_def("projects").unwrap().field_type, FieldType::Array);
        assert_eq!(s.field_def("role").unwrap().enum_values.len(), 2);
        assert!(s.options.timestamps);
        assert!(s.options.strict);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let e = Schema::from_json(r#"{"x": "Quaternion"}"#).unwrap_err();
        assert!(matches!(e, DbError::Cast(_)));
    }

    #[test]
    fn unknown_option_key_is_rejected() {
        assert!(Schema::from_json(r#"{"x": {"type": "String", "colour": "red"}}"#).is_err());
    }
}
