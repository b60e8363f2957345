//! Attribute resolution: package defaults overlaid with user overrides.
//!
//! Attributes are addressed by dotted keys (`image.tag`). Nested default
//! tables are flattened on the way in, so a template placeholder never
//! has to know whether a value came from a table or an override.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing an override string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("malformed attribute override '{pair}': {reason}")]
    MalformedOverride { pair: String, reason: &'static str },
}

/// Concrete parameters for template rendering, keyed by dotted path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet(BTreeMap<String, Value>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a nested JSON object into dotted keys.
    ///
    /// Arrays and scalars are leaves; a non-object root yields an empty set.
    pub fn from_nested(value: &Value) -> Self {
        let mut set = Self::new();
        if let Value::Object(map) = value {
            for (key, v) in map {
                flatten_into(&mut set.0, key, v);
            }
        }
        set
    }

    /// Flatten a TOML table (the `[attributes]` section of a package).
    pub fn from_toml(table: &toml::Table) -> Self {
        let value = serde_json::to_value(table).unwrap_or(Value::Null);
        Self::from_nested(&value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, v) in map {
                flatten_into(out, &format!("{prefix}.{key}"), v);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Resolve the attribute set for rendering.
///
/// Defaults are applied first and overrides last, so an override always
/// wins on a shared key. Override keys unknown to the defaults pass
/// through.
pub fn resolve(overrides: &str, defaults: &AttributeSet) -> Result<AttributeSet, ResolveError> {
    let mut resolved = defaults.clone();
    for (key, value) in parse_overrides(overrides)? {
        resolved.insert(key, value);
    }
    Ok(resolved)
}

/// Parse `key=value,other.key=value` into ordered pairs.
///
/// Values that parse as JSON keep their type (`3`, `true`, `["a","b"]`);
/// anything else is taken as a plain string. Commas nested inside
/// brackets, braces or quotes do not split pairs.
pub fn parse_overrides(raw: &str) -> Result<Vec<(String, Value)>, ResolveError> {
    split_top_level(raw)
        .into_iter()
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ResolveError::MalformedOverride {
                    pair: pair.to_string(),
                    reason: "expected key=value",
                })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ResolveError::MalformedOverride {
                    pair: pair.to_string(),
                    reason: "empty key",
                });
            }
            Ok((key.to_string(), parse_value(value.trim())))
        })
        .collect()
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        if in_quotes {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> AttributeSet {
        AttributeSet::from_nested(&json!({
            "replicas": 2,
            "image": { "name": "guestbook", "tag": "v1" },
            "debug": false
        }))
    }

    #[test]
    fn nested_defaults_are_flattened() {
        let set = defaults();
        assert_eq!(set.get("image.tag"), Some(&json!("v1")));
        assert_eq!(set.get("replicas"), Some(&json!(2)));
        assert!(!set.contains_key("image"));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let set = resolve("replicas=5, image.tag=v2", &defaults()).unwrap();
        assert_eq!(set.get("replicas"), Some(&json!(5)));
        assert_eq!(set.get("image.tag"), Some(&json!("v2")));
        assert_eq!(set.get("image.name"), Some(&json!("guestbook")));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let set = resolve("extra.key=hello", &defaults()).unwrap();
        assert_eq!(set.get("extra.key"), Some(&json!("hello")));
        assert_eq!(set.len(), defaults().len() + 1);
    }

    #[test]
    fn empty_overrides_yield_defaults() {
        assert_eq!(resolve("", &defaults()).unwrap(), defaults());
        assert_eq!(resolve("  ,  ", &defaults()).unwrap(), defaults());
    }

    #[test]
    fn resolution_is_idempotent() {
        let first = resolve("debug=true,replicas=1", &defaults()).unwrap();
        let second = resolve("debug=true,replicas=1", &defaults()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn last_override_wins() {
        let set = resolve("replicas=1,replicas=7", &defaults()).unwrap();
        assert_eq!(set.get("replicas"), Some(&json!(7)));
    }

    #[test]
    fn override_values_keep_json_types() {
        let pairs = parse_overrides(r#"a=3,b=true,c=["x","y"],d={"k":1,"j":2},e=plain text"#).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), json!(3)),
                ("b".to_string(), json!(true)),
                ("c".to_string(), json!(["x", "y"])),
                ("d".to_string(), json!({ "k": 1, "j": 2 })),
                ("e".to_string(), json!("plain text")),
            ]
        );
    }

    #[test]
    fn value_may_contain_equals_sign() {
        let pairs = parse_overrides("args=--mode=fast").unwrap();
        assert_eq!(pairs, vec![("args".to_string(), json!("--mode=fast"))]);
    }

    #[test]
    fn pair_without_equals_is_malformed() {
        let err = resolve("replicas", &defaults()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MalformedOverride {
                pair: "replicas".into(),
                reason: "expected key=value"
            }
        );
    }

    #[test]
    fn empty_key_is_malformed() {
        let err = resolve("=3", &defaults()).unwrap_err();
        assert!(matches!(err, ResolveError::MalformedOverride { reason: "empty key", .. }));
    }

    #[test]
    fn toml_defaults_are_flattened() {
        let table: toml::Table = toml::from_str(
            r#"
replicas = 3
[image]
tag = "v3"
"#,
        )
        .unwrap();
        let set = AttributeSet::from_toml(&table);
        assert_eq!(set.get("replicas"), Some(&json!(3)));
        assert_eq!(set.get("image.tag"), Some(&json!("v3")));
    }
}
