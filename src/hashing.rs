//! Hashing System - SHA-256 Render Keys and Manifests
//!
//! Identical render inputs must hash identically; keys are built from
//! canonical JSON so map ordering never leaks into them.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Compact JSON with object keys in byte order at every depth.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(serde_json::to_value(value)?))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect::<Map<_, _>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Feeds length-prefixed segments so no two input splits share a key.
struct KeyHasher(Sha256);

impl KeyHasher {
    fn new() -> Self {
        Self(Sha256::new())
    }

    fn segment(mut self, bytes: &[u8]) -> Self {
        self.0.update((bytes.len() as u64).to_be_bytes());
        self.0.update(bytes);
        self
    }

    fn finish(self) -> String {
        to_hex(&self.0.finalize())
    }
}

/// Key identifying one page render: program, data, theme and engine version.
pub fn compute_render_key(
    program: &impl Serialize,
    data: &impl Serialize,
    theme: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    Ok(KeyHasher::new()
        .segment(canonical_json(program)?.as_bytes())
        .segment(canonical_json(data)?.as_bytes())
        .segment(canonical_json(theme)?.as_bytes())
        .segment(engine_version.as_bytes())
        .finish())
}

/// Hash of a document manifest (page order, components, render keys).
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(manifest)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::RenderProgram;
    use crate::theme::Theme;
    use serde_json::json;

    fn key(program: &Value, data: &Value, theme: &Theme, engine: &str) -> String {
        let program: RenderProgram = serde_json::from_value(program.clone()).unwrap();
        compute_render_key(&program, data, theme, engine).unwrap()
    }

    fn title_program() -> Value {
        json!({ "body": [{ "op": "text", "text": { "var": "data.title" }, "x": 0, "y": 0, "w": 1, "h": 1 }] })
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let canonical = canonical_json(&json!({ "z": { "b": 1, "a": [{ "y": 0, "x": 0 }] }, "a": 2 })).unwrap();
        assert_eq!(canonical, r#"{"a":2,"z":{"a":[{"x":0,"y":0}],"b":1}}"#);
    }

    #[test]
    fn render_key_ignores_payload_key_order() {
        let theme = Theme::default();
        let a = key(&title_program(), &json!({ "title": "Q4", "subtitle": "FY" }), &theme, "1.0.0");
        let b = key(&title_program(), &json!({ "subtitle": "FY", "title": "Q4" }), &theme, "1.0.0");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn render_key_changes_with_every_input() {
        let theme = Theme::default();
        let data = json!({ "title": "Q4" });
        let base = key(&title_program(), &data, &theme, "1.0.0");

        let mut recolored = Theme::default();
        recolored.colors.background = recolored.colors.primary.clone();
        let other_program = json!({ "body": [] });

        assert_ne!(base, key(&other_program, &data, &theme, "1.0.0"));
        assert_ne!(base, key(&title_program(), &json!({ "title": "Q3" }), &theme, "1.0.0"));
        assert_ne!(base, key(&title_program(), &data, &recolored, "1.0.0"));
        assert_ne!(base, key(&title_program(), &data, &theme, "1.1.0"));
    }

    #[test]
    fn render_key_segments_do_not_run_together() {
        let a = compute_render_key(&json!("a:b"), &json!("c"), &json!({}), "1").unwrap();
        let b = compute_render_key(&json!("a"), &json!("b:c"), &json!({}), "1").unwrap();
        assert_ne!(a, b);
    }
}
