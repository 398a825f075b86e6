//! `{{action.payload.field}}` substitution in reaction configs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("constant regex pattern is valid"));

/// Rewrites every string in `config` against the triggering event's payload.
///
/// Placeholders whose path does not resolve are left as-is.
pub fn interpolate_config(config: &Map<String, Value>, payload: &Value) -> Map<String, Value> {
    let context = json!({ "action": { "payload": payload } });
    config
        .iter()
        .map(|(key, value)| (key.clone(), interpolate_value(value, &context)))
        .collect()
}

fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(template) => Value::String(interpolate_str(template, context)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), interpolate_value(item, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn interpolate_str(template: &str, context: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            match lookup(context, caps[1].trim()) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}
