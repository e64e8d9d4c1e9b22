//! Mapping between the decoder's internal representation and public types
//!
//! The decoder keeps every field optional and under its wire name. This
//! module applies defaults, resolves renamed fields and builds the public
//! [`Message`] values. It also maps a message back to a wire-shaped object.

use crate::message_parser::{BlockKind, MessageKind, RawBlock, RawMessage};
use crate::types::{
    AssistantMessage, ContentBlock, Message, ResultMessage, SystemMessage, TextContent,
    ToolResultContent, ToolUseContent, UserMessage,
};
use serde_json::{Map, Value, json};

/// Build a public message from a decoded one
pub(crate) fn into_public(raw: RawMessage) -> Message {
    match raw.kind {
        MessageKind::User => Message::User(UserMessage {
            content: raw.content.unwrap_or(Value::Null),
        }),
        MessageKind::Assistant => Message::Assistant(AssistantMessage {
            content: raw.blocks.into_iter().map(ContentBlock::from).collect(),
        }),
        MessageKind::System => Message::System(SystemMessage {
            subtype: raw.subtype.unwrap_or_default(),
            data: raw.data.unwrap_or_default(),
        }),
        MessageKind::Result => {
            let result = raw.result;
            Message::Result(ResultMessage {
                subtype: raw.subtype.unwrap_or_default(),
                duration_ms: result.duration_ms.unwrap_or_default(),
                duration_api_ms: result.duration_api_ms.unwrap_or_default(),
                is_error: result.is_error.unwrap_or_default(),
                num_turns: result.num_turns.unwrap_or_default(),
                session_id: result.session_id.unwrap_or_default(),
                // older CLI builds report `cost_usd`
                total_cost_usd: result.total_cost_usd.or(result.cost_usd),
                usage: result.usage,
                result: result.result,
                structured_output: result.structured_output.or(result.structured_output_camel),
            })
        },
    }
}

impl From<RawBlock> for ContentBlock {
    fn from(raw: RawBlock) -> Self {
        match raw.kind {
            BlockKind::Text => ContentBlock::Text(TextContent {
                text: raw.text.unwrap_or_default(),
            }),
            BlockKind::ToolUse => ContentBlock::ToolUse(ToolUseContent {
                id: raw.id.unwrap_or_default(),
                name: raw.name.unwrap_or_default(),
                input: raw.input.unwrap_or_default(),
            }),
            BlockKind::ToolResult => ContentBlock::ToolResult(ToolResultContent {
                tool_use_id: raw.tool_use_id.unwrap_or_default(),
                content: raw.content.unwrap_or(Value::Null),
                is_error: raw.is_error,
            }),
        }
    }
}

/// System message reporting an output line that could not be decoded
pub fn system_error(error: impl Into<String>, raw: impl Into<String>) -> SystemMessage {
    let mut data = Map::new();
    data.insert("error".into(), Value::String(error.into()));
    data.insert("raw_data".into(), Value::String(raw.into()));
    SystemMessage {
        subtype: "error".into(),
        data,
    }
}

fn block_to_wire(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text(text) => json!({"type": "text", "text": text.text}),
        ContentBlock::ToolUse(tool) => json!({
            "type": "tool_use",
            "id": tool.id,
            "name": tool.name,
            "input": tool.input,
        }),
        ContentBlock::ToolResult(result) => {
            let mut value = json!({
                "type": "tool_result",
                "tool_use_id": result.tool_use_id,
                "content": result.content,
            });
            if let (Some(is_error), Some(obj)) = (result.is_error, value.as_object_mut()) {
                obj.insert("is_error".into(), Value::Bool(is_error));
            }
            value
        },
    }
}

/// Map a message back to a flat wire object.
///
/// Decoding the returned value yields the same variant with the same fields.
pub fn to_wire(message: &Message) -> Value {
    match message {
        Message::User(user) => json!({"role": "user", "content": user.content}),
        Message::Assistant(assistant) => json!({
            "role": "assistant",
            "content": assistant.content.iter().map(block_to_wire).collect::<Vec<_>>(),
        }),
        Message::System(system) => json!({
            "type": "system",
            "subtype": system.subtype,
            "data": system.data,
        }),
        Message::Result(result) => {
            let mut obj = Map::new();
            obj.insert("type".into(), json!("result"));
            obj.insert("subtype".into(), json!(result.subtype));
            obj.insert("duration_ms".into(), json!(result.duration_ms));
            obj.insert("duration_api_ms".into(), json!(result.duration_api_ms));
            obj.insert("is_error".into(), json!(result.is_error));
            obj.insert("num_turns".into(), json!(result.num_turns));
            obj.insert("session_id".into(), json!(result.session_id));
            if let Some(cost) = result.total_cost_usd {
                obj.insert("total_cost_usd".into(), json!(cost));
            }
            if let Some(usage) = &result.usage {
                obj.insert("usage".into(), Value::Object(usage.clone()));
            }
            if let Some(text) = &result.result {
                obj.insert("result".into(), json!(text));
            }
            if let Some(output) = &result.structured_output {
                obj.insert("structured_output".into(), output.clone());
            }
            Value::Object(obj)
        },
    }
}
