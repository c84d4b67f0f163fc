//! Cell representation for a resolved value. Total and deterministic:
//! every input maps to exactly one output, and nothing here can fail.

use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// The literal written into a cell whose expression resolved to nothing.
pub const NULL_SENTINEL: &str = "NULL";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Integral values print without a trailing ".0" so spreadsheet
            // cells read as integers.
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

fn int_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-+]?\d+$").expect("int pattern"))
}

fn decimal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-+]?\d*\.\d+$").expect("decimal pattern"))
}

/// Numeric reading of a string cell candidate: integers and decimals,
/// with thousands separators stripped first.
fn numeric_from_text(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    if int_pattern().is_match(&cleaned) || decimal_pattern().is_match(&cleaned) {
        cleaned.parse::<f64>().ok()
    } else {
        None
    }
}

/// Map a resolution outcome to its one spreadsheet representation.
pub fn coerce(resolved: Option<&Value>) -> CellValue {
    match resolved {
        None | Some(Value::Null) => CellValue::Text(NULL_SENTINEL.to_string()),
        Some(Value::Number(n)) => CellValue::Number(*n),
        Some(Value::Text(s)) => match numeric_from_text(s) {
            Some(n) => CellValue::Number(n),
            None => CellValue::Text(s.clone()),
        },
        Some(compound @ (Value::Map(_) | Value::List(_))) => {
            let json = compound.to_json();
            CellValue::Text(
                serde_json::to_string(&json).unwrap_or_else(|_| format!("{json}")),
            )
        }
    }
}
