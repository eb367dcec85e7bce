#![no_main]

use jsonagg_core::JsonCollection;
use libfuzzer_sys::fuzz_target;
use serde_json::json;

// Fuzz target: arbitrary specification text against a fixed collection
// Goal: aggregate returns Ok or Err, never panics

fuzz_target!(|data: &[u8]| {
    if let Ok(spec) = std::str::from_utf8(data) {
        let collection = JsonCollection::new(json!([
            {"id": 1, "name": "Alice", "age": 30, "CreatedAt": "2023-03-17T12:34:56Z"},
            {"id": 2, "name": "Bob", "age": 25, "contacts": {"email": "bob@example.com"}},
            {"id": 3, "name": "Charlie", "age": 35.5, "active": true},
            {"id": 4, "name": null, "tags": ["x", "y"]}
        ]))
        .unwrap();

        let _ = collection.aggregate(spec);
    }
});
