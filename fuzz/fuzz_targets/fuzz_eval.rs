#![no_main]
use libfuzzer_sys::fuzz_target;
use odmlite::OdmConfig;
use odmlite::query::{SortSpec, Order, compare_docs, eval_clauses, parse_filter_json};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(clauses) = parse_filter_json(s, &OdmConfig::default())
    {
        let docs = [
            bson::doc! {"a": 1, "b": 2, "name": "x"},
            bson::doc! {"a": 10, "b": -5, "name": "y", "nested": {"z": 3}},
            bson::doc! {"active": true, "projects": ["p1", "p2", "p3"]},
        ];
        for d in &docs {
            let _ = eval_clauses(d, &clauses);
        }
        let sort = [SortSpec::new("a", Order::Desc), SortSpec::new("name", Order::Asc)];
        let _ = compare_docs(&docs[0], &docs[2], &sort);
    }
});
