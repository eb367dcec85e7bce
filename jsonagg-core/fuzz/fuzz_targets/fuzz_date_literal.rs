#![no_main]

use jsonagg_core::{parse_datetime, DateLiteralParser, ScriptDateParser};
use libfuzzer_sys::fuzz_target;

// Fuzz target: date literal scripts and date strings
// Goal: arithmetic overflow or out-of-range components surface as errors, not panics

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = ScriptDateParser::new().parse_date_literal(text);
        let _ = parse_datetime(text);
    }
});
