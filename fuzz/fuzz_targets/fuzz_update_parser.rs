#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(update) = odmlite::json::parse_json_to_bson_document(s)
        && let Ok(parsed) = odmlite::query::parse_update(&update)
    {
        let mut d = bson::doc! {"a": 1, "nested": {"z": 3}, "tags": ["x"]};
        let _ = odmlite::model::apply_update(&mut d, &parsed);
    }
});
