//! Field access into raw policy actions.
//!
//! Paths are given as key slices rather than dot strings because some Fleet
//! keys contain literal dots (`ssl.ca_trusted_fingerprint`).

use serde_json::Value;

/// Resolve a key path to a value. Numeric segments index into arrays.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use fleet_agent_core::policy::fields::resolve;
/// let data = json!({"inputs": [{"name": "logs"}]});
/// assert_eq!(resolve(&data, &["inputs", "0", "name"]), Some(&json!("logs")));
/// ```
pub fn resolve<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = data;
    for part in path {
        match current {
            Value::Object(obj) => {
                current = obj.get(*part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Non-null value at `path`.
pub fn present<'a>(data: &'a Value, path: &[&str]) -> Option<&'a Value> {
    resolve(data, path).filter(|v| !v.is_null())
}

pub fn str_at<'a>(data: &'a Value, path: &[&str]) -> Option<&'a str> {
    resolve(data, path).and_then(Value::as_str)
}

pub fn string_at(data: &Value, path: &[&str]) -> Option<String> {
    present(data, path).map(value_to_string)
}

pub fn bool_at(data: &Value, path: &[&str]) -> Option<bool> {
    present(data, path).and_then(value_to_bool)
}

pub fn u64_at(data: &Value, path: &[&str]) -> Option<u64> {
    present(data, path).and_then(value_to_u64)
}

/// String elements of the array at `path`; non-string elements are skipped.
pub fn string_list_at(data: &Value, path: &[&str]) -> Option<Vec<String>> {
    match resolve(data, path)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

/// Render scalars without JSON quoting; arrays and objects as JSON text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Non-negative integer from a number or numeric string.
pub fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_and_indexed() {
        let data = json!({"policy": {"inputs": [{"streams": [{"paths": ["a"]}]}]}});
        assert_eq!(
            resolve(&data, &["policy", "inputs", "0", "streams", "0", "paths", "0"]),
            Some(&json!("a"))
        );
    }

    #[test]
    fn test_dotted_key_is_one_segment() {
        let data = json!({"ssl.ca_trusted_fingerprint": "ab12"});
        assert_eq!(str_at(&data, &["ssl.ca_trusted_fingerprint"]), Some("ab12"));
        assert_eq!(str_at(&data, &["ssl", "ca_trusted_fingerprint"]), None);
    }

    #[test]
    fn test_missing_and_null() {
        let data = json!({"a": null, "b": {"c": 1}});
        assert!(resolve(&data, &["a"]).is_some());
        assert!(present(&data, &["a"]).is_none());
        assert_eq!(resolve(&data, &["b", "c", "d"]), None);
        assert_eq!(resolve(&data, &["b", "x"]), None);
        assert_eq!(resolve(&data, &[]), Some(&data));
    }

    #[test]
    fn test_scalar_coercion() {
        let data = json!({"n": 50, "s": "75", "neg": -1, "t": "yes", "f": 0});
        assert_eq!(u64_at(&data, &["n"]), Some(50));
        assert_eq!(u64_at(&data, &["s"]), Some(75));
        assert_eq!(u64_at(&data, &["neg"]), None);
        assert_eq!(bool_at(&data, &["t"]), Some(true));
        assert_eq!(bool_at(&data, &["f"]), Some(false));
        assert_eq!(string_at(&data, &["n"]), Some("50".to_string()));
    }

    #[test]
    fn test_string_list() {
        let data = json!({"hosts": ["https://a:9200", 7, "https://b:9200"], "one": "x"});
        assert_eq!(
            string_list_at(&data, &["hosts"]),
            Some(vec!["https://a:9200".to_string(), "https://b:9200".to_string()])
        );
        assert_eq!(string_list_at(&data, &["one"]), None);
    }
}
