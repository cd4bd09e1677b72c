#![no_main]
use libfuzzer_sys::fuzz_target;
use odmlite::OdmConfig;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = odmlite::query::parse_filter_json(s, &OdmConfig::default());
    }
});
