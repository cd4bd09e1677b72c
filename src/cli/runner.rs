use bson::Document as BsonDocument;
use std::io::Write;
use std::sync::Arc;

use super::command::{Command, Source};
use crate::config::OdmConfig;
use crate::errors::DbError;
use crate::json::{bson_document_to_json, parse_json_to_bson_document};
use crate::model::Model;
use crate::query::SortArg;
use crate::schema::Schema;

/// What a run produced: lines written and input lines rejected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub written: usize,
    pub failed: usize,
}

/// Non-empty data lines with their 1-based line numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().map(|(i, l)| (i + 1, l.trim())).filter(|(_, l)| !l.is_empty())
}

fn load_schema(source: &Source) -> Result<Schema, DbError> {
    Schema::from_json(&std::fs::read_to_string(&source.schema)?)
}

fn write_doc<W: Write>(out: &mut W, doc: BsonDocument) -> Result<(), DbError> {
    serde_json::to_writer(&mut *out, &bson_document_to_json(doc))?;
    writeln!(out)?;
    Ok(())
}

fn parse_sort(spec: &str) -> Result<SortArg, DbError> {
    if spec.trim_start().starts_with('{') {
        Ok(SortArg::Mapping(parse_json_to_bson_document(spec)?))
    } else {
        Ok(SortArg::Shorthand(spec.to_string()))
    }
}

/// Executes one command, writing NDJSON (query) or per-line reports (validate) to `out`.
///
/// # Errors
/// Returns an error for unreadable inputs, a malformed schema or query, or write failures.
pub fn run<W: Write>(cfg: &OdmConfig, cmd: Command, out: &mut W) -> Result<Report, DbError> {
    match cmd {
        Command::Query { source, filter_json, sort, skip, limit, select, lean, explain } => {
            let schema = load_schema(&source)?;
            let model = Arc::new(Model::new("cli", schema, Arc::new(cfg.clone())));
            let mut report = Report::default();
            for (n, line) in data_lines(&std::fs::read_to_string(&source.data)?) {
                let loaded = parse_json_to_bson_document(line).and_then(|d| model.create(d).map(|_| ()));
                if let Err(e) = loaded {
                    log::warn!("{}:{n}: skipped: {e}", source.data.display());
                    report.failed += 1;
                }
            }
            let mut q = model.find();
            if let Some(f) = filter_json {
                q = q.filter(parse_json_to_bson_document(&f)?);
            }
            if let Some(s) = sort {
                q = q.sort(parse_sort(&s)?);
            }
            if let Some(n) = skip {
                q = q.skip(n);
            }
            if let Some(n) = limit {
                q = q.limit(n);
            }
            if let Some(s) = select {
                q = q.select(&s);
            }
            if explain {
                if let Some(e) = q.error() {
                    return Err(DbError::QueryError(e.to_string()));
                }
                write_doc(out, q.explain())?;
                report.written = 1;
                return Ok(report);
            }
            let rows: Vec<BsonDocument> = if lean {
                q.lean()?
            } else {
                q.exec()?.iter().map(|d| d.to_object(true)).collect()
            };
            for row in rows {
                write_doc(out, row)?;
                report.written += 1;
            }
            Ok(report)
        }
        Command::Validate { source } => {
            let schema = load_schema(&source)?;
            let mut report = Report::default();
            for (n, line) in data_lines(&std::fs::read_to_string(&source.data)?) {
                match parse_json_to_bson_document(line).and_then(|d| schema.validate(&d)) {
                    Ok(_) => writeln!(out, "line {n}: ok")?,
                    Err(e) => {
                        writeln!(out, "line {n}: {e}")?;
                        report.failed += 1;
                    }
                }
                report.written += 1;
            }
            Ok(report)
        }
    }
}
