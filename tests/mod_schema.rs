use bson::{Bson, doc};
use odmlite::{Database, DbError, FieldDef, FieldType, Schema};

fn person_schema() -> Schema {
    Schema::new()
        .field("first", FieldDef::new(FieldType::String).required())
        .field("last", FieldDef::new(FieldType::String).required())
        .field("age", FieldDef::new(FieldType::Number).min(0.0))
        .field("role", FieldDef::new(FieldType::String).default_value("user").one_of(["user", "admin"]))
        .virtual_get("full_name", |d| {
            let first = d.get_str("first").unwrap_or_default();
            let last = d.get_str("last").unwrap_or_default();
            Bson::String(format!("{first} {last}"))
        })
        .virtual_set("full_name", |d, v| {
            let Bson::String(s) = v else {
                return Err(DbError::Validation { path: "full_name".into(), message: "expected a string".into() });
            };
            let (first, last) = s.split_once(' ').unwrap_or((s.as_str(), ""));
            d.insert("first", first);
            d.insert("last", last);
            Ok(())
        })
        .virtual_get("initials", |d| {
            let pick = |k: &str| d.get_str(k).ok().and_then(|s| s.chars().next()).unwrap_or('?');
            Bson::String(format!("{}{}", pick("first"), pick("last")))
        })
        .method("greet", |doc, args| {
            let greeting = args.first().and_then(Bson::as_str).unwrap_or("hello");
            Ok(Bson::String(format!("{greeting}, {}", doc.get("first").and_then(|b| b.as_str().map(str::to_string)).unwrap_or_default())))
        })
        .method("birthday", |doc, _| {
            let age = doc.get("age").and_then(|b| b.as_i32()).unwrap_or(0);
            doc.set("age", age + 1)?;
            doc.save()?;
            Ok(Bson::Int32(age + 1))
        })
        .static_fn("adults", |model, _| {
            Ok(Bson::Int64(i64::try_from(model.count_documents(&doc! {"age": {"$gte": 18}})?).unwrap_or(0)))
        })
        .query_helper("by_last", |q, args| match args.first() {
            Some(v) => q.where_("last").equals(v.clone()),
            None => q.fail(DbError::QueryError("by_last needs a name".into())),
        })
}

#[test]
fn required_paths_are_enforced() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    let err = m.create(doc! {"first": "ann"}).unwrap_err();
    assert!(matches!(err, DbError::Validation { ref path, .. } if path == "last"));
    assert!(m.is_empty());
}

#[test]
fn defaults_enums_and_ranges() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    let d = m.create(doc! {"first": "a", "last": "b"}).unwrap();
    assert_eq!(d.get("role"), Some(Bson::String("user".into())));
    assert!(m.create(doc! {"first": "a", "last": "b", "role": "root"}).is_err());
    assert!(m.create(doc! {"first": "a", "last": "b", "age": -1}).is_err());
    let d = m.create(doc! {"first": "a", "last": "b", "age": "42"}).unwrap();
    assert_eq!(d.get("age"), Some(Bson::Int32(42)));
}

#[test]
fn virtuals_compute_and_are_not_persisted() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    let mut d = m.create(doc! {"first": "Ada", "last": "Lovelace"}).unwrap();
    assert_eq!(d.get("full_name"), Some(Bson::String("Ada Lovelace".into())));
    assert_eq!(d.get("initials"), Some(Bson::String("AL".into())));

    d.set("full_name", "Grace Hopper").unwrap();
    d.save().unwrap();
    let stored = m.find_by_id(d.id()).unwrap();
    assert_eq!(stored.get("first"), Some(Bson::String("Grace".into())));
    assert!(stored.data.get("full_name").is_none());

    let obj = stored.to_object(true);
    assert_eq!(obj.get_str("full_name").unwrap(), "Grace Hopper");
    assert!(stored.to_object(false).get("full_name").is_none());

    let err = d.set("initials", "XX").unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
    assert!(d.set("full_name", 3).is_err());
}

#[test]
fn lean_results_skip_virtuals() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    m.create(doc! {"first": "Ada", "last": "Lovelace"}).unwrap();
    let rows = m.find().lean().unwrap();
    assert!(rows[0].get("full_name").is_none());
}

#[test]
fn instance_methods_see_the_document() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    let mut d = m.create(doc! {"first": "Ada", "last": "Lovelace", "age": 36}).unwrap();
    assert_eq!(d.call("greet", &[]).unwrap(), Bson::String("hello, Ada".into()));
    assert_eq!(d.call("greet", &[Bson::String("hi".into())]).unwrap(), Bson::String("hi, Ada".into()));
    assert_eq!(d.call("birthday", &[]).unwrap(), Bson::Int32(37));
    assert_eq!(m.find_by_id(d.id()).unwrap().get("age"), Some(Bson::Int32(37)));
    assert!(matches!(d.call("fly", &[]), Err(DbError::NoSuchMethod(_))));
}

#[test]
fn statics_run_against_the_model() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    m.insert_many(vec![
        doc! {"first": "a", "last": "x", "age": 10},
        doc! {"first": "b", "last": "y", "age": 20},
        doc! {"first": "c", "last": "z", "age": 30},
    ])
    .unwrap();
    assert_eq!(m.call_static("adults", &[]).unwrap(), Bson::Int64(2));
    assert!(matches!(m.call_static("nope", &[]), Err(DbError::NoSuchMethod(_))));
}

#[test]
fn query_helpers_extend_the_chain() {
    let db = Database::new();
    let m = db.model("people", person_schema()).unwrap();
    m.insert_many(vec![
        doc! {"first": "a", "last": "smith", "age": 10},
        doc! {"first": "b", "last": "smith", "age": 40},
        doc! {"first": "c", "last": "jones", "age": 50},
    ])
    .unwrap();
    let found = m.find().helper("by_last", &[Bson::String("smith".into())]).where_("age").gt(18).exec().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("first"), Some(Bson::String("b".into())));

    let err = m.find().helper("by_last", &[]).exec().unwrap_err();
    assert!(matches!(err, DbError::QueryError(_)));
}

#[test]
fn strict_schemas_drop_undeclared_paths() {
    let db = Database::new();
    let strict = db.model("strict", person_schema()).unwrap();
    let d = strict.create(doc! {"first": "a", "last": "b", "extra": 1}).unwrap();
    assert!(d.data.get("extra").is_none());
    let loose = db.model("loose", person_schema().strict(false)).unwrap();
    let d = loose.create(doc! {"first": "a", "last": "b", "extra": 1}).unwrap();
    assert_eq!(d.data.get_i32("extra").unwrap(), 1);
}

#[test]
fn declarations_parse_from_json() {
    let schema = Schema::from_json(
        r#"{"title": {"type": "String", "required": true, "minLength": 3},
            "hits": {"type": "Number", "default": 0},
            "slug": {"type": "String", "match": "^[a-z-]+$"}}"#,
    )
    .unwrap();
    let db = Database::new();
    let m = db.model("posts", schema).unwrap();
    let d = m.create(doc! {"title": "Hello", "slug": "hello-world"}).unwrap();
    assert!(matches!(d.get("hits"), Some(Bson::Int32(0) | Bson::Int64(0))));
    assert!(m.create(doc! {"title": "Hi"}).is_err());
    assert!(m.create(doc! {"title": "Hello", "slug": "Not A Slug"}).is_err());
}
