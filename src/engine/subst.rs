use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::engine::vars::VariableContext;

/// `{name}` or `{name.path.0.key}`: variable name, then an optional dot-path
/// walked through mapping keys and sequence indices.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)((?:\.\w+)*)\}").expect("placeholder regex"))
}

/// Replace every resolvable placeholder in `input`. Any failure — missing
/// variable, missing key, bad index — leaves that placeholder text unchanged
/// and logs a warning; substitution never raises and never partially mutates
/// a placeholder.
pub fn substitute_str(input: &str, ctx: &VariableContext, rule: &str) -> String {
    placeholder_re()
        .replace_all(input, |caps: &Captures| {
            let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let name = &caps[1];
            let path = &caps[2];

            let Some(captured) = ctx.get(name) else {
                tracing::warn!(rule = %rule, placeholder = %full, "variable not in context, placeholder left");
                return full.to_string();
            };

            let wrapped = captured.as_json();
            let mut current = &wrapped;
            for segment in path.split('.').filter(|s| !s.is_empty()) {
                let next = match current {
                    Value::Object(map) => map.get(segment),
                    Value::Array(items) => segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|idx| items.get(idx)),
                    _ => None,
                };
                match next {
                    Some(v) => current = v,
                    None => {
                        tracing::warn!(
                            rule = %rule,
                            placeholder = %full,
                            segment = %segment,
                            "path not resolvable, placeholder left"
                        );
                        return full.to_string();
                    }
                }
            }
            value_to_string(current)
        })
        .into_owned()
}

/// Recursive substitution over strings, sequences, and mappings. Non-string
/// leaves pass through untouched.
pub fn substitute_value(input: &Value, ctx: &VariableContext, rule: &str) -> Value {
    match input {
        Value::String(s) => Value::String(substitute_str(s, ctx, rule)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, ctx, rule))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, ctx, rule)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
