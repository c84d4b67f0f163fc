//! Free-form expression resolution against the dataset store.
//!
//! An expression is a leading identifier plus zero or more bracketed,
//! quoted path segments: `alpha_service["nr_band"]`. Matching is two-tier
//! at every level: exact first, then case-insensitive with punctuation
//! stripped. Numeric indices, wildcards and computed sub-expressions are
//! deliberately unsupported; a miss resolves to `None`, never an error.

use crate::value::{Record, Value, normalize_name};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn root_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_]\w*)(.*)$").expect("root pattern"))
}

fn key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[['"]([^'"]+)['"]\]"#).expect("key pattern"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    pub root: String,
    pub path: Vec<String>,
}

/// Split an expression into its root variable and key path. Trailing text
/// that contains no bracketed string literal makes the expression invalid.
pub fn parse_expression(expr: &str) -> Option<ParsedExpression> {
    let expr = expr.trim();
    let caps = root_pattern().captures(expr)?;
    let root = caps.get(1)?.as_str().to_string();
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    if rest.trim().is_empty() {
        return Some(ParsedExpression { root, path: Vec::new() });
    }

    let path: Vec<String> = key_pattern()
        .captures_iter(rest)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if path.is_empty() {
        return None;
    }
    Some(ParsedExpression { root, path })
}

fn lookup_key<'a>(map: &'a Record, key: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(key) {
        return Some(v);
    }
    let wanted = normalize_name(key);
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key) || normalize_name(k) == wanted)
        .map(|(_, v)| v)
}

/// Resolve an expression against the variable table. `None` means "not
/// found": unknown root, unmatched key, or traversal into a non-mapping.
pub fn resolve_expression(expr: &str, vars: &BTreeMap<String, Value>) -> Option<Value> {
    let parsed = parse_expression(expr)?;

    let wanted = normalize_name(&parsed.root);
    let root_key = vars
        .keys()
        .find(|k| normalize_name(k) == wanted)
        .or_else(|| {
            vars.keys()
                .find(|k| k.eq_ignore_ascii_case(&parsed.root))
        })?;

    let mut current = vars.get(root_key)?;
    for key in &parsed.path {
        let Value::Map(map) = current else {
            return None;
        };
        current = lookup_key(map, key)?;
    }
    Some(current.clone())
}
