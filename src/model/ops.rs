use bson::{Bson, Document as BsonDocument};
use std::sync::Arc;
use std::time::Instant;

use super::core::Model;
use crate::document::{set_path, unset_path};
use crate::errors::DbError;
use crate::query::{
    DeleteReport, UpdateDoc, UpdateReport, eval_clauses, get_path, parse_filter, parse_update,
};
use crate::types::ID_FIELD;

/// Sum for `$inc`: integer pairs add exactly and widen to `Int64` when needed,
/// anything involving a `Double` adds as floats.
fn add_numbers(path: &str, cur: &Bson, by: &Bson) -> Result<Bson, DbError> {
    let int = |v: &Bson| match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    };
    #[allow(clippy::cast_precision_loss)]
    let float = |v: &Bson| match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    };
    match (cur, by) {
        (Bson::Int32(a), Bson::Int32(b)) => {
            Ok(a.checked_add(*b).map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32))
        }
        _ => match (int(cur), int(by)) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(Bson::Int64)
                .ok_or_else(|| DbError::QueryError(format!("$inc overflows `{path}`"))),
            _ => match (float(cur), float(by)) {
                (Some(a), Some(b)) => Ok(Bson::Double(a + b)),
                _ => Err(DbError::QueryError(format!("$inc cannot apply to non-numeric `{path}`"))),
            },
        },
    }
}

/// Applies `$set`, `$inc` and `$unset`. Returns whether anything changed.
///
/// # Errors
/// Returns `DbError::QueryError` when `$inc` targets a non-numeric value or overflows.
pub fn apply_update(doc: &mut BsonDocument, upd: &UpdateDoc) -> Result<bool, DbError> {
    let mut changed = false;
    for (k, v) in &upd.set {
        changed |= set_path(doc, k, v.clone());
    }
    for (k, by) in &upd.inc {
        let next = match get_path(doc, k) {
            Some(cur) => add_numbers(k, cur, by)?,
            None => by.clone(),
        };
        changed |= set_path(doc, k, next);
    }
    for k in &upd.unset {
        changed |= unset_path(doc, k);
    }
    Ok(changed)
}

fn touches_id(upd: &UpdateDoc) -> bool {
    upd.set.iter().any(|(k, _)| k == ID_FIELD)
        || upd.inc.iter().any(|(k, _)| k == ID_FIELD)
        || upd.unset.iter().any(|k| k == ID_FIELD)
}

impl Model {
    fn update_matching(
        self: &Arc<Self>,
        filter: &BsonDocument,
        update: &BsonDocument,
        single: bool,
    ) -> Result<UpdateReport, DbError> {
        let start = Instant::now();
        let clauses = parse_filter(filter, self.config())?;
        let upd = parse_update(update)?;
        if touches_id(&upd) {
            return Err(DbError::validation(ID_FIELD, "the identity of a document cannot change"));
        }
        let mut store = self.store.write();
        let targets: Vec<u64> = store
            .docs
            .iter()
            .filter(|(_, s)| eval_clauses(&s.data, &clauses))
            .map(|(seq, _)| *seq)
            .take(if single { 1 } else { usize::MAX })
            .collect();
        // Stage every write first so a validation failure leaves the store untouched.
        let mut staged = Vec::new();
        for seq in &targets {
            let Some(stored) = store.docs.get(seq) else { continue };
            let mut data = stored.data.clone();
            if apply_update(&mut data, &upd)? {
                let prepared = self.prepare(&data, &stored.id, Some(&stored.data))?;
                staged.push((*seq, prepared));
            }
        }
        let report = UpdateReport { matched: targets.len() as u64, modified: staged.len() as u64 };
        for (seq, data) in staged {
            if let Some(slot) = store.docs.get_mut(&seq) {
                slot.data = data;
            }
        }
        crate::qlog!(
            "{{\"op\":\"update\",\"collection\":\"{}\",\"duration_us\":{},\"matched\":{},\"modified\":{}}}",
            self.name(),
            start.elapsed().as_micros(),
            report.matched,
            report.modified
        );
        Ok(report)
    }

    /// # Errors
    /// Returns an error for malformed filters or updates, or when the result fails validation.
    pub fn update_one(self: &Arc<Self>, filter: &BsonDocument, update: &BsonDocument) -> Result<UpdateReport, DbError> {
        self.update_matching(filter, update, true)
    }

    /// All-or-nothing: if any updated document fails validation, none is written.
    ///
    /// # Errors
    /// Returns an error for malformed filters or updates, or when a result fails validation.
    pub fn update_many(self: &Arc<Self>, filter: &BsonDocument, update: &BsonDocument) -> Result<UpdateReport, DbError> {
        self.update_matching(filter, update, false)
    }

    fn delete_matching(&self, filter: &BsonDocument, single: bool) -> Result<DeleteReport, DbError> {
        let clauses = parse_filter(filter, self.config())?;
        let mut store = self.store.write();
        let targets: Vec<u64> = store
            .docs
            .iter()
            .filter(|(_, s)| eval_clauses(&s.data, &clauses))
            .map(|(seq, _)| *seq)
            .take(if single { 1 } else { usize::MAX })
            .collect();
        let deleted = targets.into_iter().filter(|seq| store.remove_seq(*seq)).count() as u64;
        crate::qlog!("{{\"op\":\"delete\",\"collection\":\"{}\",\"deleted\":{}}}", self.name(), deleted);
        Ok(DeleteReport { deleted })
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the filter is malformed.
    pub fn delete_one(&self, filter: &BsonDocument) -> Result<DeleteReport, DbError> {
        self.delete_matching(filter, true)
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the filter is malformed.
    pub fn delete_many(&self, filter: &BsonDocument) -> Result<DeleteReport, DbError> {
        self.delete_matching(filter, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OdmConfig;
    use crate::schema::{FieldDef, FieldType, Schema};
    use bson::doc;

    #[test]
    fn update_doc_set_inc_unset() {
        let mut d = doc! {"x": 1, "y": 2, "z": 0, "f": 1.5};
        let ud = UpdateDoc {
            set: vec![("y".into(), Bson::Int32(5))],
            inc: vec![
                ("x".into(), Bson::Int32(2)),
                ("f".into(), Bson::Int32(1)),
                ("info.visits".into(), Bson::Int32(1)),
            ],
            unset: vec!["z".into()],
        };
        assert!(apply_update(&mut d, &ud).unwrap());
        assert_eq!(d.get_i32("y").unwrap(), 5);
        assert_eq!(d.get_i32("x").unwrap(), 3);
        assert_eq!(d.get_f64("f").unwrap(), 2.5);
        assert_eq!(d.get_document("info").unwrap().get_i32("visits").unwrap(), 1);
        assert!(d.get("z").is_none());
    }

    #[test]
    fn inc_keeps_integers_exact() {
        let big = 9_007_199_254_740_993_i64;
        let mut d = doc! {"n": 0_i64, "small": i32::MAX, "f": 1, "s": "x", "top": i64::MAX};
        let inc = |path: &str, by: Bson| UpdateDoc { inc: vec![(path.into(), by)], ..UpdateDoc::default() };
        apply_update(&mut d, &inc("n", Bson::Int64(big))).unwrap();
        assert_eq!(d.get_i64("n").unwrap(), big);
        apply_update(&mut d, &inc("small", Bson::Int32(1))).unwrap();
        assert_eq!(d.get_i64("small").unwrap(), i64::from(i32::MAX) + 1);
        apply_update(&mut d, &inc("f", Bson::Double(0.5))).unwrap();
        assert_eq!(d.get_f64("f").unwrap(), 1.5);
        assert!(apply_update(&mut d, &inc("top", Bson::Int64(1))).is_err());
        assert!(apply_update(&mut d, &inc("s", Bson::Int32(1))).is_err());
        assert_eq!(d.get_i64("top").unwrap(), i64::MAX);
    }

    fn scores() -> Arc<Model> {
        let schema = Schema::new()
            .field("name", FieldDef::new(FieldType::String).required())
            .field("score", FieldDef::new(FieldType::Number).max(100.0));
        let m = Arc::new(Model::new("scores", schema, Arc::new(OdmConfig::default())));
        m.insert_many(vec![doc! {"name": "a", "score": 10}, doc! {"name": "b", "score": 95}]).unwrap();
        m
    }

    #[test]
    fn update_many_is_all_or_nothing() {
        let m = scores();
        let e = m.update_many(&doc! {}, &doc! {"$inc": {"score": 10}}).unwrap_err();
        assert!(matches!(e, DbError::Validation { .. }));
        assert_eq!(m.count_documents(&doc! {"score": 10}).unwrap(), 1);
        let r = m.update_many(&doc! {"score": {"$lt": 50}}, &doc! {"$inc": {"score": 5}}).unwrap();
        assert_eq!(r, UpdateReport { matched: 1, modified: 1 });
        assert_eq!(m.count_documents(&doc! {"score": 15}).unwrap(), 1);
    }

    #[test]
    fn update_one_touches_a_single_document() {
        let m = scores();
        let r = m.update_one(&doc! {}, &doc! {"$set": {"name": "z"}}).unwrap();
        assert_eq!(r.matched, 1);
        assert_eq!(m.count_documents(&doc! {"name": "z"}).unwrap(), 1);
        assert!(m.update_one(&doc! {}, &doc! {"$set": {"_id": "x"}}).is_err());
    }

    #[test]
    fn delete_one_and_many() {
        let m = scores();
        assert_eq!(m.delete_one(&doc! {}).unwrap().deleted, 1);
        assert_eq!(m.len(), 1);
        assert_eq!(m.delete_many(&doc! {"score": {"$gte": 0}}).unwrap().deleted, 1);
        assert!(m.is_empty());
    }
}
