//! Prints what a device's local cache file holds: every stored collection, its schema version
//! tag, and a preview of its payload.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tandem::{SchemaGate, cache::parse_entries};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <path-to-cache-file>", args[0]);
        eprintln!("\nExample: {} ./trip-cache.json", args[0]);
        std::process::exit(1);
    }

    let file_path = PathBuf::from(&args[1]);
    let bytes = match std::fs::read(&file_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file_path.display(), e);
            std::process::exit(1);
        }
    };

    let entries = match parse_entries(&file_path, &bytes) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("A collection manager would treat this cache as empty.");
            std::process::exit(1);
        }
    };

    println!("TandemScope - Local Cache Inspector");
    println!("===================================");
    println!("File: {}", file_path.display());
    println!("Entries: {}", entries.len());
    println!();

    let (tags, payloads): (BTreeMap<_, _>, BTreeMap<_, _>) = entries
        .iter()
        .partition(|(key, _)| key.ends_with("-version"));

    for (key, raw) in &payloads {
        println!("Collection: {key}");

        let tag = tags.get(&format!("{key}-version"));
        match tag.map(|tag| SchemaGate::parse_tag(Some(tag.as_str()))) {
            Some(Some(version)) => println!("  Schema version: {version}"),
            Some(None) => println!("  ⚠️  Schema version tag is malformed"),
            None => println!("  ⚠️  No schema version tag, this payload will be discarded on load"),
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(payload) => {
                println!("  Payload: {}", describe(&payload));
                println!("  Data: {}", preview(raw));
            }
            Err(e) => println!("  ❌ Payload is not valid JSON: {e}"),
        }
        println!();
    }

    for (key, tag) in &tags {
        if !payloads.contains_key(&key.trim_end_matches("-version").to_string()) {
            println!("  ⚠️  Version tag {key} = {tag} has no payload");
        }
    }
}

fn describe(payload: &Value) -> String {
    match payload {
        Value::Array(items) => format!("list of {} items", items.len()),
        Value::Object(map) => format!("map of {} entries", map.len()),
        Value::Null => "empty".to_string(),
        other => format!("scalar {other}"),
    }
}

fn preview(raw: &str) -> String {
    if raw.len() <= 100 {
        return raw.to_string();
    }
    let mut end = 100;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}
