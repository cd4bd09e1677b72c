#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(schema) = odmlite::Schema::from_json(s)
    {
        let _ = schema.validate(&bson::doc! {"name": "x", "hits": "12", "tags": "solo"});
    }
});
