//! Cache key derivation from tool calls.
//!
//! A key is the SHA-256 of the tool name together with a canonical rendering
//! of its input: volatile fields removed, object keys sorted recursively,
//! integral floats folded into integers, and resource paths lexically
//! normalized. Array order is preserved because it is part of the call.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};
use toolcache_common::CacheKey;

use crate::error::KeyError;

/// Top-level input fields that never affect a tool's result.
pub const DEFAULT_VOLATILE_FIELDS: &[&str] =
    &["description", "run_in_background", "dangerouslyDisableSandbox"];

/// Input fields holding a file path or URL.
pub const DEFAULT_PATH_FIELDS: &[&str] = &["file_path", "path", "notebook_path", "url"];

/// Maximum nesting depth followed while canonicalizing.
pub const MAX_INPUT_DEPTH: usize = 64;

/// Derives stable cache keys from `(tool name, input)` pairs.
///
/// Derivation is a pure function of its arguments and the deriver's field
/// sets; identical calls always produce identical keys.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    volatile_fields: BTreeSet<String>,
    path_fields: BTreeSet<String>,
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(
            DEFAULT_VOLATILE_FIELDS.iter().copied(),
            DEFAULT_PATH_FIELDS.iter().copied(),
        )
    }
}

impl KeyDeriver {
    /// Creates a deriver with custom volatile and path field names.
    pub fn new<'a>(
        volatile_fields: impl IntoIterator<Item = &'a str>,
        path_fields: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            volatile_fields: volatile_fields.into_iter().map(str::to_string).collect(),
            path_fields: path_fields.into_iter().map(str::to_string).collect(),
        }
    }

    /// Derives the cache key for a call.
    ///
    /// Fails only when the input cannot be canonicalized, in which case the
    /// caller should treat the call as uncacheable.
    pub fn derive(&self, tool_name: &str, input: &Value) -> Result<CacheKey, KeyError> {
        let canonical = self.canonicalize(input)?;
        // A two-element array keeps the tool name and input unambiguous.
        let framed = Value::Array(vec![Value::String(tool_name.to_string()), canonical]);
        Ok(CacheKey::digest(framed.to_string().as_bytes()))
    }

    /// Returns the canonical form of `input` used for hashing.
    pub fn canonicalize(&self, input: &Value) -> Result<Value, KeyError> {
        match input {
            Value::Object(map) => {
                let kept = map
                    .iter()
                    .filter(|(k, _)| !self.volatile_fields.contains(k.as_str()));
                self.canonical_object(kept, 1)
            }
            other => self.canonical_value(other, 1, false),
        }
    }

    fn canonical_object<'v>(
        &self,
        fields: impl Iterator<Item = (&'v String, &'v Value)>,
        depth: usize,
    ) -> Result<Value, KeyError> {
        let mut fields: Vec<_> = fields.collect();
        // Insert in sorted order so the result is sorted whether or not
        // serde_json's `preserve_order` feature is enabled.
        fields.sort_by(|a, b| a.0.cmp(b.0));
        let mut out = Map::new();
        for (k, v) in fields {
            let is_path = self.path_fields.contains(k.as_str());
            out.insert(k.clone(), self.canonical_value(v, depth + 1, is_path)?);
        }
        Ok(Value::Object(out))
    }

    fn canonical_value(&self, value: &Value, depth: usize, is_path: bool) -> Result<Value, KeyError> {
        if depth > MAX_INPUT_DEPTH {
            return Err(KeyError::TooDeep {
                limit: MAX_INPUT_DEPTH,
            });
        }
        Ok(match value {
            Value::Object(map) => self.canonical_object(map.iter(), depth)?,
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.canonical_value(v, depth + 1, false))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Number(n) => Value::Number(canonical_number(n)),
            Value::String(s) if is_path => Value::String(normalize_path(s)),
            other => other.clone(),
        })
    }
}

/// Folds floats with no fractional part into integers so `1.0` and `1` agree.
fn canonical_number(n: &Number) -> Number {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                return Number::from(f as i64);
            }
        }
    }
    n.clone()
}

/// Lexically normalizes a file path or URL.
///
/// Surrounding whitespace is trimmed. URLs are otherwise left untouched.
/// For paths, empty and `.` components are dropped and `..` consumes the
/// preceding component; the filesystem is never consulted, so symlinks are
/// not resolved.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        return trimmed.to_string();
    }

    let absolute = trimmed.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for component in trimmed.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(tool: &str, input: Value) -> CacheKey {
        KeyDeriver::default().derive(tool, &input).unwrap()
    }

    #[test]
    fn deterministic() {
        let input = json!({"file_path": "/a.txt", "offset": 10});
        assert_eq!(key("Read", input.clone()), key("Read", input));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"pattern":"fn","path":"src","opts":{"x":1,"y":2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"opts":{"y":2,"x":1},"path":"src","pattern":"fn"}"#).unwrap();
        assert_eq!(key("Grep", a), key("Grep", b));
    }

    #[test]
    fn volatile_fields_ignored() {
        let plain = json!({"file_path": "/a.txt"});
        let described = json!({"file_path": "/a.txt", "description": "peek at a"});
        let backgrounded = json!({"file_path": "/a.txt", "run_in_background": true});
        assert_eq!(key("Read", plain.clone()), key("Read", described));
        assert_eq!(key("Read", plain), key("Read", backgrounded));
    }

    #[test]
    fn volatile_names_only_stripped_at_top_level() {
        let a = json!({"query": {"description": "x"}});
        let b = json!({"query": {"description": "y"}});
        assert_ne!(key("WebSearch", a), key("WebSearch", b));
    }

    #[test]
    fn semantic_fields_change_the_key() {
        assert_ne!(
            key("Read", json!({"file_path": "/a.txt"})),
            key("Read", json!({"file_path": "/b.txt"}))
        );
        assert_ne!(
            key("Read", json!({"file_path": "/a.txt"})),
            key("Read", json!({"file_path": "/a.txt", "offset": 5}))
        );
        assert_ne!(
            key("Grep", json!({"pattern": "foo "})),
            key("Grep", json!({"pattern": "foo"}))
        );
    }

    #[test]
    fn tool_name_is_part_of_the_key() {
        let input = json!({"path": "src"});
        assert_ne!(key("Glob", input.clone()), key("Grep", input));
    }

    #[test]
    fn tool_name_and_input_do_not_run_together() {
        assert_ne!(key("a:1", json!(2)), key("a", json!(12)));
    }

    #[test]
    fn integral_floats_fold_into_integers() {
        assert_eq!(
            key("Read", json!({"file_path": "/a", "limit": 100.0})),
            key("Read", json!({"file_path": "/a", "limit": 100}))
        );
        assert_ne!(
            key("Read", json!({"file_path": "/a", "limit": 100.5})),
            key("Read", json!({"file_path": "/a", "limit": 100}))
        );
    }

    #[test]
    fn array_order_is_significant() {
        assert_ne!(
            key("WebSearch", json!({"allowed_domains": ["a.com", "b.com"]})),
            key("WebSearch", json!({"allowed_domains": ["b.com", "a.com"]}))
        );
    }

    #[test]
    fn path_fields_are_normalized() {
        assert_eq!(
            key("Read", json!({"file_path": " /repo/./src//lib.rs "})),
            key("Read", json!({"file_path": "/repo/src/lib.rs"}))
        );
    }

    #[test]
    fn non_object_inputs_are_keyed() {
        assert_eq!(key("Echo", json!("hi")), key("Echo", json!("hi")));
        assert_ne!(key("Echo", json!("hi")), key("Echo", json!(null)));
    }

    #[test]
    fn excessive_nesting_fails() {
        let mut value = json!(1);
        for _ in 0..(MAX_INPUT_DEPTH + 1) {
            value = json!([value]);
        }
        let err = KeyDeriver::default()
            .derive("Read", &json!({ "file_path": value }))
            .unwrap_err();
        assert_eq!(err, KeyError::TooDeep { limit: MAX_INPUT_DEPTH });
    }

    #[test]
    fn custom_volatile_fields() {
        let deriver = KeyDeriver::new(["nonce"], DEFAULT_PATH_FIELDS.iter().copied());
        let a = deriver.derive("Fetch", &json!({"url": "u", "nonce": 1})).unwrap();
        let b = deriver.derive("Fetch", &json!({"url": "u", "nonce": 2})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_path_cases() {
        assert_eq!(normalize_path("/a/./b//c"), "/a/b/c");
        assert_eq!(normalize_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_path("/../a"), "/a");
        assert_eq!(normalize_path("x/../y"), "y");
        assert_eq!(normalize_path("../y"), "../y");
        assert_eq!(normalize_path("./"), ".");
        assert_eq!(normalize_path("  /a.txt\n"), "/a.txt");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("https://x.io/a/../b"), "https://x.io/a/../b");
        assert_eq!(normalize_path("   "), "");
    }
}
