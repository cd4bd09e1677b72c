use bson::{Bson, doc};
use odmlite::{Database, DocumentId, FieldDef, FieldType, Model, Schema};
use std::sync::Arc;

fn numbers(n: i32) -> Arc<Model> {
    let db = Database::new();
    let m = db.model("numbers", Schema::new().field("n", FieldDef::new(FieldType::Number))).unwrap();
    m.insert_many((0..n).map(|i| doc! {"n": i}).collect()).unwrap();
    m
}

fn n_of(d: &odmlite::Document) -> i32 {
    d.get("n").and_then(|b| b.as_i32()).unwrap()
}

#[test]
fn cursor_is_lazy_and_applies_skip_limit() {
    let m = numbers(10);
    let mut cur = m.where_("n").gte(3).skip(2).limit(3).cursor().unwrap();
    assert_eq!(cur.yielded(), 0);
    assert_eq!(n_of(&cur.next_doc().unwrap()), 5);
    assert_eq!(cur.yielded(), 1);
    let rest: Vec<i32> = cur.by_ref().map(|d| n_of(&d)).collect();
    assert_eq!(rest, vec![6, 7]);
    assert!(cur.is_exhausted());
}

#[test]
fn exhaustion_is_monotonic() {
    let m = numbers(2);
    let mut cur = m.find().cursor().unwrap();
    assert!(cur.next().is_some());
    assert!(cur.next().is_some());
    assert!(cur.next().is_none());
    assert!(cur.is_exhausted());
    m.create(doc! {"n": 99}).unwrap();
    assert!(cur.next().is_none());
    assert!(cur.next_doc().is_none());
}

#[test]
fn documents_deleted_after_open_are_skipped() {
    let m = numbers(5);
    let mut sorted = m.find().sort("-n").cursor().unwrap();
    let mut scan = m.find().cursor().unwrap();
    assert_eq!(n_of(&sorted.next_doc().unwrap()), 4);
    assert_eq!(n_of(&scan.next_doc().unwrap()), 0);
    m.delete_many(&doc! {"n": {"$in": [1, 3]}}).unwrap();
    assert_eq!(sorted.map(|d| n_of(&d)).collect::<Vec<_>>(), vec![2, 0]);
    assert_eq!(scan.map(|d| n_of(&d)).collect::<Vec<_>>(), vec![2, 4]);
}

#[test]
fn independent_cursors_do_not_block_writers() {
    let m = numbers(3);
    let mut a = m.find().cursor().unwrap();
    let mut b = m.find().cursor().unwrap();
    assert_eq!(n_of(&a.next_doc().unwrap()), 0);
    m.create(doc! {"n": 3}).unwrap();
    assert_eq!(n_of(&b.next_doc().unwrap()), 0);
    assert_eq!(a.count(), 3);
    assert_eq!(b.to_vec().len(), 3);
}

#[test]
fn projected_results_save_by_merging() {
    let db = Database::new();
    let m = db
        .model(
            "people",
            Schema::new()
                .field("name", FieldDef::new(FieldType::String).required())
                .field("age", FieldDef::new(FieldType::Number)),
        )
        .unwrap();
    let created = m.create(doc! {"name": "ann", "age": 30}).unwrap();
    let mut cur = m.find().select("age").cursor().unwrap();
    let mut d = cur.next_doc().unwrap();
    assert!(d.data.get("name").is_none());
    d.set("age", 31).unwrap();
    d.save().unwrap();
    let stored = m.find_by_id(created.id()).unwrap();
    assert_eq!(stored.get("name"), Some(Bson::String("ann".into())));
    assert_eq!(stored.get("age"), Some(Bson::Int32(31)));
}

#[test]
fn sliced_arrays_survive_a_save() {
    let db = Database::new();
    let m = db.model("tagged", Schema::new().strict(false)).unwrap();
    let created = m
        .create(doc! {"name": "a", "tags": ["t1", "t2", "t3"], "info": {"items": [1, 2, 3], "k": 1}})
        .unwrap();

    let mut d = m.where_("tags").slice(1).exec().unwrap().remove(0);
    assert_eq!(d.get("tags"), Some(Bson::Array(vec!["t1".into()])));
    d.set("name", "b").unwrap();
    d.save().unwrap();
    let stored = m.find_by_id(created.id()).unwrap();
    assert_eq!(stored.data.get_array("tags").unwrap().len(), 3);
    assert_eq!(stored.get("name"), Some(Bson::String("b".into())));
    assert_eq!(d.data.get_array("tags").unwrap().len(), 3);

    // replacing a sliced array writes the new value
    let mut d = m.where_("info.items").slice(-1).exec().unwrap().remove(0);
    assert_eq!(d.get("info.items"), Some(Bson::Array(vec![Bson::Int32(3)])));
    d.set("info.items", vec![9]).unwrap();
    d.save().unwrap();
    let stored = m.find_by_id(created.id()).unwrap();
    assert_eq!(stored.get("info.items"), Some(Bson::Array(vec![Bson::Int32(9)])));
    assert_eq!(stored.get("info.k"), Some(Bson::Int32(1)));
    assert_eq!(stored.data.get_array("tags").unwrap().len(), 3);
}

#[test]
fn dotted_projection_saves_without_dropping_siblings() {
    let db = Database::new();
    let m = db.model("visits", Schema::new().strict(false)).unwrap();
    let created = m.create(doc! {"info": {"visits": 3, "city": "oslo"}, "x": 1}).unwrap();
    let mut d = m.find().select("info.visits").exec_one().unwrap().unwrap();
    assert!(d.data.get("x").is_none());
    d.set("info.visits", 4).unwrap();
    d.save().unwrap();
    let stored = m.find_by_id(created.id()).unwrap();
    assert_eq!(stored.data.get_document("info").unwrap(), &doc! {"visits": 4, "city": "oslo"});
    assert_eq!(stored.get("x"), Some(Bson::Int32(1)));
}

#[test]
fn lean_cursor_yields_plain_documents() {
    let m = numbers(4);
    let cur = m.find().sort("-n").limit(2).cursor().unwrap();
    let rows: Vec<bson::Document> = cur.lean().collect();
    assert_eq!(rows.iter().map(|r| r.get_i32("n").unwrap()).collect::<Vec<_>>(), vec![3, 2]);
}

#[test]
fn identity_round_trips_through_the_store() {
    let m = numbers(1);
    let d = m.find().exec_one().unwrap().unwrap();
    let id: DocumentId = d.data.get_str("_id").unwrap().parse().unwrap();
    assert_eq!(&id, d.id());
}

#[tokio::test]
async fn async_cursor_and_exec() {
    let m = numbers(6);
    let mut cur = m.where_("n").modulo(2, 0).cursor().unwrap();
    let mut seen = Vec::new();
    while let Some(d) = cur.next_async().await {
        seen.push(n_of(&d));
    }
    assert_eq!(seen, vec![0, 2, 4]);
    assert!(cur.next_async().await.is_none());

    let docs = m.find().sort("-n").limit(2).exec_async().await.unwrap();
    assert_eq!(docs.iter().map(n_of).collect::<Vec<_>>(), vec![5, 4]);
}

#[tokio::test]
async fn async_exec_reports_chain_errors() {
    let m = numbers(1);
    let mut q = m.find().gt(3);
    assert!(q.exec_async().await.is_err());
}
