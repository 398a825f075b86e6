#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use area_engine::engine::{interpolate_config, interpolate_str};
use serde_json::{Map, Value, json};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[test]
fn strings_are_substituted_from_the_payload() {
    let payload = json!({
        "pusher": { "name": "ada" },
        "commits": [{ "id": "c0ffee" }],
        "count": 3,
        "forced": false,
    });
    let config = object(json!({
        "text": "{{action.payload.pusher.name}} pushed {{ action.payload.count }} commits",
        "first": "{{action.payload.commits.0.id}}",
        "forced": "{{action.payload.forced}}",
        "whole": "{{action.payload.pusher}}",
        "untouched": 7,
    }));

    let out = interpolate_config(&config, &payload);

    assert_eq!(out["text"], json!("ada pushed 3 commits"));
    assert_eq!(out["first"], json!("c0ffee"));
    assert_eq!(out["forced"], json!("false"));
    assert_eq!(out["whole"], json!(r#"{"name":"ada"}"#));
    assert_eq!(out["untouched"], json!(7));
}

#[test]
fn nested_values_are_walked() {
    let payload = json!({ "channel": "ops" });
    let config = object(json!({
        "targets": ["#{{action.payload.channel}}", 1],
        "embed": { "title": "to {{action.payload.channel}}" },
    }));

    let out = interpolate_config(&config, &payload);

    assert_eq!(out["targets"], json!(["#ops", 1]));
    assert_eq!(out["embed"]["title"], json!("to ops"));
}

#[test]
fn unresolved_placeholders_are_kept() {
    let context = json!({ "action": { "payload": { "a": { "b": 1 } } } });

    assert_eq!(
        interpolate_str("{{action.payload.a.c}}", &context),
        "{{action.payload.a.c}}"
    );
    assert_eq!(
        interpolate_str("{{action.payload.a.b.c}}", &context),
        "{{action.payload.a.b.c}}"
    );
    assert_eq!(interpolate_str("{{user.id}}", &context), "{{user.id}}");
    assert_eq!(interpolate_str("plain text", &context), "plain text");
}
