//! Conversion from JSON row values to sea-query bind values.
//!
//! Rows travel through the facade as JSON maps; every value that reaches a
//! statement goes through [`to_value`] and is bound as a parameter.

use sea_query::Value;

/// Convert one JSON value into a bind value.
///
/// Arrays and objects are bound as JSON documents.
pub fn to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::String(None),
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::from(s.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::from(json.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_map_to_typed_values() {
        assert_eq!(to_value(&json!(true)), Value::from(true));
        assert_eq!(to_value(&json!(42)), Value::from(42i64));
        assert_eq!(to_value(&json!(2.5)), Value::from(2.5f64));
        assert_eq!(to_value(&json!("a")), Value::from("a".to_string()));
        assert_eq!(to_value(&json!(null)), Value::String(None));
    }
}
