use std::collections::BTreeMap;

/// A flat or nested extraction record: field name -> value.
pub type Record = BTreeMap<String, Value>;

/// Tagged value model for everything the analyzer returns and the
/// resolver traverses. Booleans are not measurements; they map to `Null`
/// on the way in so they can never contribute to a slot or an average.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Map(Record),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by the aggregator: numbers directly, numeric
    /// strings by parse, everything else (including booleans, which are
    /// already `Null`) contributes nothing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null | serde_json::Value::Bool(_) => Value::Null,
            serde_json::Value::Number(n) => {
                n.as_f64().map(Value::Number).unwrap_or(Value::Null)
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Number(n) => json_number(*n),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    pub fn record_from_json(v: &serde_json::Value) -> Option<Record> {
        match Value::from_json(v) {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Integral values serialize as JSON integers, not `1.0`-style floats, so
/// written-back compound cells read the way the extraction did.
fn json_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        serde_json::Value::Number(serde_json::Number::from(n as i64))
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Null-coalescing merge: a field is written only when the target lacks it
/// or holds `Null`, and the incoming value is non-null. Keys are never
/// deleted, so merging the same result twice is a no-op the second time.
pub fn merge_fields(target: &mut Record, new: &Record) {
    for (key, value) in new {
        if value.is_null() {
            continue;
        }
        let slot = target.entry(key.clone()).or_insert(Value::Null);
        if slot.is_null() {
            *slot = value.clone();
        }
    }
}

/// Schema keys absent from the record or held at `Null`, in schema order.
pub fn missing_fields(record: &Record, schema_keys: &[&'static str]) -> Vec<&'static str> {
    schema_keys
        .iter()
        .filter(|k| record.get(**k).map(Value::is_null).unwrap_or(true))
        .copied()
        .collect()
}

/// Strip non-alphanumerics and lowercase, so `Alpha_Service`,
/// `alphaservice` and `alpha_service` all compare equal.
pub fn normalize_name(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
