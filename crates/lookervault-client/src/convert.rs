use lookervault_codec::Value;

use crate::error::ClientError;

/// Looker responses arrive as `serde_json::Value`; the rest of the system
/// speaks `lookervault_codec::Value` so every payload, regardless of source,
/// goes through the same deterministic encoder. `serde_json`'s
/// `preserve_order` feature keeps object key order intact across this hop.
pub fn json_to_value(json: &serde_json::Value) -> Result<Value, ClientError> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                return Err(ClientError::Malformed(format!("unrepresentable number {n}")));
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => {
            let converted = items
                .iter()
                .map(json_to_value)
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(converted)
        }
        serde_json::Value::Object(map) => {
            let converted = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
                .collect::<Result<Vec<_>, ClientError>>()?;
            Value::Map(converted)
        }
    })
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => {
            serde_json::Value::Array(b.iter().map(|byte| serde_json::Value::from(*byte)).collect())
        }
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(map)
        }
    }
}
