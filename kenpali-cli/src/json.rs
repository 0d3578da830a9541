//! JSON input: expression trees and host names arrive as JSON documents.

use kenpali_common::{Map, Value};

/// Parse a JSON document into a Kenpali value. Object key order is kept.
pub fn parse(text: &str) -> Result<Value, serde_json::Error> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(to_value(&json))
}

pub fn to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(to_value).collect()),
        serde_json::Value::Object(entries) => {
            let map: Map = entries
                .iter()
                .map(|(key, value)| (key.clone(), to_value(value)))
                .collect();
            Value::object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(parse("null").unwrap(), Value::Null);
        assert_eq!(parse("true").unwrap(), Value::Boolean(true));
        assert_eq!(parse("-2.5").unwrap(), Value::from(-2.5));
        assert_eq!(parse("\"a\\nb\"").unwrap(), Value::from("a\nb"));
    }

    #[test]
    fn objects_keep_key_order() {
        let value = parse(r#"{"z": 1, "a": [2, {"m": null}]}"#).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse("{\"a\": ").is_err());
    }
}
