//! Message parsing utilities
//!
//! The CLI emits one JSON object per line and does not reliably tag its
//! objects, so a message is classified by which fields it carries. The
//! classification is an ordered chain of predicates: the first match wins.
//!
//! Decoding happens in three steps:
//!
//! 1. parse the line as JSON (the only step that can fail),
//! 2. normalize the CLI envelope (`{"type": .., "message": {..}}` is lifted),
//! 3. classify and extract every field defensively into an internal
//!    representation, then hand it to [`crate::adapter`].
//!
//! Extraction never fails: a field that is present but has the wrong JSON
//! type is treated as absent.

use crate::{
    adapter,
    errors::{Result, SdkError},
    types::Message,
};
use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{trace, warn};

/// Which message variant an object decodes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `role == "user"`
    User,
    /// `role == "assistant"`, or nothing else matched
    Assistant,
    /// `subtype` and `data` present
    System,
    /// `duration_ms` present (with or without `subtype`)
    Result,
}

/// Which content block variant an object decodes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `text` present, or nothing else matched
    Text,
    /// `name` and `input` present
    ToolUse,
    /// `tool_use_id` present
    ToolResult,
}

fn has(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(|value| !value.is_null())
}

/// Classify a decoded JSON object into a message kind.
///
/// `role` wins over every other field. Without a recognized role, `subtype`
/// plus `data` means System, and `duration_ms` means Result. Anything else is
/// treated as an assistant message.
pub fn classify_message(value: &Value) -> MessageKind {
    match value.as_object() {
        Some(obj) => classify_object(obj),
        None => MessageKind::Assistant,
    }
}

fn classify_object(obj: &Map<String, Value>) -> MessageKind {
    match obj.get("role").and_then(Value::as_str) {
        Some("user") => return MessageKind::User,
        Some("assistant") => return MessageKind::Assistant,
        _ => {},
    }

    let has_subtype = has(obj, "subtype");
    if has_subtype && has(obj, "data") {
        MessageKind::System
    } else if has(obj, "duration_ms") {
        MessageKind::Result
    } else {
        MessageKind::Assistant
    }
}

/// Classify a content block object.
///
/// A block carrying both `text` and `tool_use_id` is a Text block.
pub fn classify_content_block(value: &Value) -> BlockKind {
    let Some(obj) = value.as_object() else {
        return BlockKind::Text;
    };

    if has(obj, "text") {
        BlockKind::Text
    } else if has(obj, "name") && has(obj, "input") {
        BlockKind::ToolUse
    } else if has(obj, "tool_use_id") {
        BlockKind::ToolResult
    } else {
        BlockKind::Text
    }
}

/// Decoded message before defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawMessage {
    pub kind: MessageKind,
    pub content: Option<Value>,
    pub blocks: Vec<RawBlock>,
    pub subtype: Option<String>,
    pub data: Option<Map<String, Value>>,
    pub result: RawResult,
}

/// Decoded content block before defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawBlock {
    pub kind: BlockKind,
    pub text: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input: Option<Map<String, Value>>,
    pub tool_use_id: Option<String>,
    pub content: Option<Value>,
    pub is_error: Option<bool>,
}

/// Result fields under their wire names
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawResult {
    pub duration_ms: Option<i64>,
    pub duration_api_ms: Option<i64>,
    pub is_error: Option<bool>,
    pub num_turns: Option<i32>,
    pub session_id: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub cost_usd: Option<f64>,
    pub usage: Option<Map<String, Value>>,
    pub result: Option<String>,
    pub structured_output: Option<Value>,
    pub structured_output_camel: Option<Value>,
}

fn string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn int(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

fn float(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

fn boolean(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

fn object(obj: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    obj.get(key).and_then(Value::as_object).cloned()
}

fn present(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    obj.get(key).filter(|value| !value.is_null()).cloned()
}

/// Lift the CLI envelope so classification sees flat objects.
///
/// `{"type": "assistant", "message": {"role": .., "content": ..}}` gets its
/// inner `role` and `content` copied to the top level when the outer object
/// has no `role`. A `type == "system"` object without `data` gets its
/// remaining fields as `data`.
pub(crate) fn normalize_envelope(mut obj: Map<String, Value>) -> Map<String, Value> {
    if !has(&obj, "role")
        && let Some(Value::Object(inner)) = obj.get("message")
    {
        let role = present(inner, "role");
        let content = present(inner, "content");
        if let Some(role) = role {
            obj.insert("role".into(), role);
        }
        if let Some(content) = content
            && !has(&obj, "content")
        {
            obj.insert("content".into(), content);
        }
    }

    if obj.get("type").and_then(Value::as_str) == Some("system") && !has(&obj, "data") {
        let data: Map<String, Value> = obj
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "type" | "subtype" | "data"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        obj.insert("data".into(), Value::Object(data));
    }

    obj
}

fn extract_block(value: &Value) -> RawBlock {
    let kind = classify_content_block(value);
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    RawBlock {
        kind,
        text: string(obj, "text"),
        id: string(obj, "id"),
        name: string(obj, "name"),
        input: object(obj, "input"),
        tool_use_id: string(obj, "tool_use_id"),
        content: present(obj, "content"),
        is_error: boolean(obj, "is_error"),
    }
}

fn extract_blocks(content: Option<&Value>) -> Vec<RawBlock> {
    match content {
        Some(Value::Array(items)) => items.iter().map(extract_block).collect(),
        // A bare string is a single text block
        Some(Value::String(text)) => vec![RawBlock {
            kind: BlockKind::Text,
            text: Some(text.clone()),
            id: None,
            name: None,
            input: None,
            tool_use_id: None,
            content: None,
            is_error: None,
        }],
        _ => Vec::new(),
    }
}

fn extract_result(obj: &Map<String, Value>) -> RawResult {
    RawResult {
        duration_ms: int(obj, "duration_ms"),
        duration_api_ms: int(obj, "duration_api_ms"),
        is_error: boolean(obj, "is_error"),
        num_turns: int(obj, "num_turns").and_then(|n| i32::try_from(n).ok()),
        session_id: string(obj, "session_id"),
        total_cost_usd: float(obj, "total_cost_usd"),
        cost_usd: float(obj, "cost_usd"),
        usage: object(obj, "usage"),
        result: string(obj, "result"),
        structured_output: present(obj, "structured_output"),
        structured_output_camel: present(obj, "structuredOutput"),
    }
}

/// Classify and extract without applying defaults
pub(crate) fn extract(value: &Value) -> RawMessage {
    let obj = match value {
        Value::Object(obj) => normalize_envelope(obj.clone()),
        _ => Map::new(),
    };
    let kind = classify_object(&obj);

    let mut raw = RawMessage {
        kind,
        content: None,
        blocks: Vec::new(),
        subtype: None,
        data: None,
        result: RawResult::default(),
    };

    match kind {
        MessageKind::User => raw.content = present(&obj, "content"),
        MessageKind::Assistant => raw.blocks = extract_blocks(obj.get("content")),
        MessageKind::System => {
            raw.subtype = string(&obj, "subtype");
            raw.data = object(&obj, "data");
        },
        MessageKind::Result => {
            raw.subtype = string(&obj, "subtype");
            raw.result = extract_result(&obj);
        },
    }

    raw
}

/// Decode an already parsed JSON value. Never fails.
pub fn decode_value(value: &Value) -> Message {
    adapter::into_public(extract(value))
}

/// Decode one output line into a message.
///
/// The only error is invalid JSON, reported as [`SdkError::Decode`] with the
/// raw bytes attached.
pub fn decode_message(line: &[u8]) -> Result<Message> {
    let value: Value = serde_json::from_slice(line).map_err(|source| SdkError::Decode {
        raw: Bytes::copy_from_slice(line),
        source,
    })?;
    trace!("Decoding CLI frame: {value}");
    Ok(decode_value(&value))
}

/// Decode one output line, turning a decode failure into an inline
/// `System { subtype: "error" }` message so the stream can go on.
pub fn decode_frame(line: &[u8]) -> Message {
    match decode_message(line) {
        Ok(message) => message,
        Err(SdkError::Decode { raw, source }) => {
            let raw = String::from_utf8_lossy(&raw).into_owned();
            warn!("Failed to decode CLI output line: {source}");
            Message::System(adapter::system_error(source.to_string(), raw))
        },
        Err(other) => Message::System(adapter::system_error(
            other.to_string(),
            String::from_utf8_lossy(line).into_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Message};
    use serde_json::json;

    #[test]
    fn test_role_wins_over_everything() {
        let value = json!({
            "role": "user",
            "subtype": "init",
            "data": {},
            "duration_ms": 12
        });
        assert_eq!(classify_message(&value), MessageKind::User);

        let value = json!({"role": "assistant", "duration_ms": 12});
        assert_eq!(classify_message(&value), MessageKind::Assistant);
    }

    #[test]
    fn test_unknown_role_falls_through() {
        let value = json!({"role": "tool", "duration_ms": 5});
        assert_eq!(classify_message(&value), MessageKind::Result);
    }

    #[test]
    fn test_subtype_and_data_is_system() {
        let value = json!({"subtype": "init", "data": {"cwd": "/tmp"}});
        assert_eq!(classify_message(&value), MessageKind::System);
    }

    #[test]
    fn test_subtype_and_duration_is_result() {
        let value = json!({"subtype": "success", "duration_ms": 150});
        assert_eq!(classify_message(&value), MessageKind::Result);
    }

    #[test]
    fn test_duration_without_subtype_is_result() {
        let value = json!({"duration_ms": 150, "num_turns": 1});
        assert_eq!(classify_message(&value), MessageKind::Result);
    }

    #[test]
    fn test_default_is_assistant() {
        assert_eq!(classify_message(&json!({})), MessageKind::Assistant);
        assert_eq!(
            classify_message(&json!({"subtype": "orphan"})),
            MessageKind::Assistant
        );
        assert_eq!(classify_message(&json!([1, 2])), MessageKind::Assistant);
    }

    #[test]
    fn test_block_classification_order() {
        assert_eq!(
            classify_content_block(&json!({"text": "hi"})),
            BlockKind::Text
        );
        assert_eq!(
            classify_content_block(&json!({"id": "t1", "name": "Read", "input": {}})),
            BlockKind::ToolUse
        );
        assert_eq!(
            classify_content_block(&json!({"tool_use_id": "t1", "content": "ok"})),
            BlockKind::ToolResult
        );
        // name without input is not a tool use
        assert_eq!(
            classify_content_block(&json!({"name": "Read"})),
            BlockKind::Text
        );
        assert_eq!(classify_content_block(&json!({})), BlockKind::Text);
    }

    #[test]
    fn test_text_and_tool_use_id_is_text() {
        let block = json!({"text": "done", "tool_use_id": "t1"});
        assert_eq!(classify_content_block(&block), BlockKind::Text);

        let message = decode_value(&json!({"role": "assistant", "content": [block]}));
        match message {
            Message::Assistant(assistant) => {
                assert_eq!(assistant.content.len(), 1);
                assert!(matches!(
                    &assistant.content[0],
                    ContentBlock::Text(text) if text.text == "done"
                ));
            },
            other => panic!("Expected assistant message, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_is_lifted() {
        let line = br#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Hello"}]},"session_id":"abc"}"#;
        let message = decode_message(line).unwrap();
        match message {
            Message::Assistant(assistant) => assert_eq!(assistant.text(), "Hello"),
            other => panic!("Expected assistant message, got {other:?}"),
        }

        let line = br#"{"type":"user","message":{"role":"user","content":"Hi"}}"#;
        match decode_message(line).unwrap() {
            Message::User(user) => assert_eq!(user.content, json!("Hi")),
            other => panic!("Expected user message, got {other:?}"),
        }
    }

    #[test]
    fn test_system_envelope_gets_data() {
        let line = br#"{"type":"system","subtype":"init","cwd":"/work","tools":["Read"]}"#;
        match decode_message(line).unwrap() {
            Message::System(system) => {
                assert_eq!(system.subtype, "init");
                assert_eq!(system.data.get("cwd"), Some(&json!("/work")));
                assert!(!system.data.contains_key("type"));
            },
            other => panic!("Expected system message, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_typed_fields_are_absent() {
        let value = json!({
            "subtype": "success",
            "duration_ms": "fast",
            "num_turns": "many",
            "is_error": "nope",
            "session_id": 42
        });
        // duration_ms is present so classification still says Result
        match decode_value(&value) {
            Message::Result(result) => {
                assert_eq!(result.duration_ms, 0);
                assert_eq!(result.num_turns, 0);
                assert!(!result.is_error);
                assert_eq!(result.session_id, "");
            },
            other => panic!("Expected result message, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_json_keeps_raw_bytes() {
        let line = br#"{"role": "assistant", "content": [}"#;
        match decode_message(line) {
            Err(SdkError::Decode { raw, .. }) => assert_eq!(&raw[..], &line[..]),
            other => panic!("Expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_frame_converts_failure_to_system_error() {
        let message = decode_frame(b"not json at all");
        let system = message.as_error().expect("system error message");
        assert_eq!(
            system.data.get("raw_data"),
            Some(&json!("not json at all"))
        );
        assert!(system.data.get("error").and_then(Value::as_str).is_some());
    }

    #[test]
    fn test_assistant_string_content_is_one_text_block() {
        match decode_value(&json!({"role": "assistant", "content": "plain"})) {
            Message::Assistant(assistant) => assert_eq!(assistant.text(), "plain"),
            other => panic!("Expected assistant message, got {other:?}"),
        }
    }
}
