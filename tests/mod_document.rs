use bson::{Bson, doc};
use odmlite::{Database, DbError, DocumentId, FieldDef, FieldType, OdmConfig, Schema};

fn posts(db: &Database) -> std::sync::Arc<odmlite::Model> {
    let schema = Schema::new()
        .field("title", FieldDef::new(FieldType::String).required().min_length(1))
        .field("views", FieldDef::new(FieldType::Number).default_value(0))
        .field("tags", FieldDef::new(FieldType::Array))
        .timestamps(true);
    db.model("posts", schema).unwrap()
}

#[test]
fn new_documents_save_once_then_update() {
    let db = Database::new();
    let m = posts(&db);
    let mut d = m.new_document(doc! {"title": "draft"}).unwrap();
    assert!(d.is_new());
    assert!(m.is_empty());
    d.save().unwrap();
    assert!(!d.is_new());
    assert_eq!(m.len(), 1);
    assert_eq!(d.get("views"), Some(Bson::Int32(0)));
    assert!(d.data.get("createdAt").is_some());

    d.set("title", "final").unwrap();
    d.save().unwrap();
    assert_eq!(m.len(), 1);
    assert_eq!(m.find_by_id(d.id()).unwrap().get("title"), Some(Bson::String("final".into())));
}

#[test]
fn invalid_saves_leave_the_store_untouched() {
    let db = Database::new();
    let m = posts(&db);
    let mut d = m.create(doc! {"title": "ok"}).unwrap();
    d.set("title", "").unwrap();
    assert!(d.validate().is_err());
    assert!(matches!(d.save(), Err(DbError::Validation { .. })));
    assert_eq!(m.find_by_id(d.id()).unwrap().get("title"), Some(Bson::String("ok".into())));
}

#[test]
fn identity_cannot_be_reassigned() {
    let db = Database::new();
    let m = posts(&db);
    let mut d = m.create(doc! {"title": "t"}).unwrap();
    assert!(d.set("_id", "other").is_err());
    let r = m.update_one(&doc! {}, &doc! {"$set": {"_id": DocumentId::new().to_string()}});
    assert!(r.is_err());
}

#[test]
fn nested_paths_set_and_read() {
    let db = Database::new();
    let m = db.model("loose", Schema::new().strict(false)).unwrap();
    let mut d = m.create(doc! {"a": 1}).unwrap();
    d.set("info.visits", 3).unwrap();
    d.save().unwrap();
    assert_eq!(m.where_("info.visits").gte(3).count().unwrap(), 1);
    assert_eq!(d.get("info.visits"), Some(Bson::Int32(3)));
}

#[test]
fn supplied_ids_must_be_uuids() {
    let db = Database::new();
    let m = posts(&db);
    let err = m.create(doc! {"_id": "post-1", "title": "t"}).unwrap_err();
    assert!(matches!(err, DbError::Cast(_)));
    assert!(m.new_document(doc! {"_id": 1, "title": "t"}).is_err());
    assert!(m.is_empty());
    let id = DocumentId::new();
    let d = m.create(doc! {"_id": id.to_string(), "title": "t"}).unwrap();
    assert_eq!(d.id(), &id);
    assert!(m.find_by_id(&id).is_some());
}

#[test]
fn remove_deletes_the_stored_copy() {
    let db = Database::new();
    let m = posts(&db);
    let a = m.create(doc! {"title": "a"}).unwrap();
    m.create(doc! {"title": "b"}).unwrap();
    assert!(a.remove());
    assert!(m.find_by_id(a.id()).is_none());
    assert_eq!(m.find().count().unwrap(), 1);
}

#[test]
fn insert_many_is_all_or_nothing() {
    let db = Database::new();
    let m = posts(&db);
    let err = m.insert_many(vec![doc! {"title": "a"}, doc! {"views": 2}]).unwrap_err();
    assert!(matches!(err, DbError::Validation { ref path, .. } if path == "title"));
    assert!(m.is_empty());
    let docs = m.insert_many(vec![doc! {"title": "a", "tags": "solo"}, doc! {"title": "b"}]).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].get("tags"), Some(Bson::Array(vec![Bson::String("solo".into())])));
}

#[test]
fn registry_limits_flow_into_queries() {
    let db = Database::with_config(OdmConfig { max_limit: 2, max_in_set: 1, ..OdmConfig::default() });
    let m = posts(&db);
    m.insert_many((0..5).map(|i| doc! {"title": format!("t{i}"), "views": i}).collect()).unwrap();
    assert_eq!(m.find().limit(50).exec().unwrap().len(), 2);
    assert_eq!(m.where_("views").in_values([3]).count().unwrap(), 1);
    let err = m.where_("views").in_values([0, 1, 2]).count().unwrap_err();
    assert!(matches!(err, DbError::QueryError(_)));
    let err = m.where_("tags").all(["a", "zzz"]).exec().unwrap_err();
    assert!(matches!(err, DbError::QueryError(_)));
    assert!(m.count_documents(&doc! {"views": {"$nin": [1, 2]}}).is_err());
}
