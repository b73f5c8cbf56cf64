use serde::Serialize;
use serde_json::{Map, Value};

/// Compact JSON with object keys sorted at every level.
///
/// Key order must not depend on serde_json's `preserve_order` feature, which
/// any crate in the graph can switch on.
pub fn canonical_json_string(value: &Value) -> Result<String, serde_json::Error> {
    fn stable(v: &Value) -> Value {
        match v {
            Value::Object(m) => {
                let mut keys: Vec<_> = m.keys().cloned().collect();
                keys.sort();
                let mut out = Map::new();
                for k in keys {
                    out.insert(k.clone(), stable(&m[&k]));
                }
                Value::Object(out)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(stable).collect()),
            _ => v.clone(),
        }
    }
    let s = stable(value);
    serde_json::to_string(&s)
}

/// Canonical JSON of any serializable value.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    canonical_json_string(&serde_json::to_value(value)?)
}
