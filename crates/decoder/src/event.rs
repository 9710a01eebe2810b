// SPDX-License-Identifier: MIT

//! Pure decoding of one JSON object read from a child's stdout into a
//! [`DecodedEvent`] (spec.md §4.B "Event decoder").
//!
//! The decoder never mutates anything and never fails: unknown shapes fold
//! to [`DecodedEvent::Unknown`] rather than an error, matching the
//! teacher's `log_entry::extract_entries` stance of tolerating whatever the
//! child writes.

use gueridon_core::SlashCommand;
use serde_json::Value;

/// One line of the child's stdout, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    SystemInit(SystemInit),
    StreamMessageStart,
    StreamBlockStart {
        index: u32,
        kind: BlockKind,
        id: Option<String>,
        name: Option<String>,
    },
    StreamBlockDelta {
        index: u32,
        delta: StreamDelta,
    },
    StreamBlockStop {
        index: u32,
    },
    StreamMessageDelta,
    StreamMessageStop,
    AssistantComplete(AssistantComplete),
    ApiErrorAssistant {
        message: String,
    },
    UserText {
        text: String,
    },
    ToolResults(Vec<DecodedToolResult>),
    TurnResult(TurnResult),
    /// Non-JSON line, unrecognised `type`, or a shape too malformed to
    /// extract anything useful from.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemInit {
    pub model: Option<String>,
    pub cwd: Option<String>,
    pub session_id: Option<String>,
    pub slash_commands: Option<Vec<SlashCommand>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Text(String),
    Thinking(String),
    InputJson(String),
    Signature(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantComplete {
    pub message_id: String,
    pub content: Vec<ContentBlock>,
    pub usage: gueridon_core::Usage,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        text: String,
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToolResult {
    pub tool_use_id: String,
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSubtype {
    Success,
    Aborted,
    Error,
    ErrorMaxTurns,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModelUsage {
    pub context_window: u64,
    pub cost_usd: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnResult {
    pub subtype: Option<TurnSubtype>,
    /// Per-model usage map, keyed by model name (spec.md §4.C: "the window
    /// reported in the per-model usage map").
    pub usage_by_model: Vec<(String, ModelUsage)>,
    pub summary: Option<String>,
}

impl TurnResult {
    /// The context window to use for percent computation: the first
    /// reported model's window, falling back to the 200k default
    /// (spec.md §9, Open Question: default preserved verbatim).
    pub fn context_window_or_default(&self) -> u64 {
        self.usage_by_model
            .first()
            .map(|(_, u)| u.context_window)
            .filter(|w| *w > 0)
            .unwrap_or(200_000)
    }
}

fn get<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    v.get(key)
}

fn get_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn get_u64(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(Value::as_u64)
}

fn get_bool(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Decode one JSON object from the child's stdout.
///
/// `line` is expected to already be valid JSON (the caller drops non-JSON
/// lines before calling this, mirroring the teacher's `extract_entries`
/// which skips lines that fail `serde_json::from_str`).
pub fn decode_event(json: &Value) -> DecodedEvent {
    match get_str(json, "type") {
        Some("system") if get_str(json, "subtype") == Some("init") => {
            DecodedEvent::SystemInit(decode_system_init(json))
        }
        Some("stream_event") => get(json, "event")
            .map(decode_stream_event)
            .unwrap_or(DecodedEvent::Unknown),
        Some("assistant") => decode_assistant(json),
        Some("user") => decode_user(json),
        Some("result") => DecodedEvent::TurnResult(decode_turn_result(json)),
        _ => DecodedEvent::Unknown,
    }
}

fn decode_system_init(json: &Value) -> SystemInit {
    let slash_commands = get(json, "slash_commands")
        .or_else(|| get(json, "slashCommands"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        });
    SystemInit {
        model: get_str(json, "model").map(String::from),
        cwd: get_str(json, "cwd").map(String::from),
        session_id: get_str(json, "session_id").map(String::from),
        slash_commands,
    }
}

fn decode_stream_event(event: &Value) -> DecodedEvent {
    match get_str(event, "type") {
        Some("message_start") => DecodedEvent::StreamMessageStart,
        Some("content_block_start") => decode_block_start(event),
        Some("content_block_delta") => decode_block_delta(event),
        Some("content_block_stop") => get_u64(event, "index")
            .map(|index| DecodedEvent::StreamBlockStop {
                index: index as u32,
            })
            .unwrap_or(DecodedEvent::Unknown),
        Some("message_delta") => DecodedEvent::StreamMessageDelta,
        Some("message_stop") => DecodedEvent::StreamMessageStop,
        _ => DecodedEvent::Unknown,
    }
}

fn decode_block_start(event: &Value) -> DecodedEvent {
    let Some(index) = get_u64(event, "index") else {
        return DecodedEvent::Unknown;
    };
    let Some(block) = get(event, "content_block") else {
        return DecodedEvent::Unknown;
    };
    let kind = match get_str(block, "type") {
        Some("text") => BlockKind::Text,
        Some("thinking") => BlockKind::Thinking,
        Some("tool_use") => BlockKind::ToolUse,
        _ => return DecodedEvent::Unknown,
    };
    DecodedEvent::StreamBlockStart {
        index: index as u32,
        kind,
        id: get_str(block, "id").map(String::from),
        name: get_str(block, "name").map(String::from),
    }
}

fn decode_block_delta(event: &Value) -> DecodedEvent {
    let Some(index) = get_u64(event, "index") else {
        return DecodedEvent::Unknown;
    };
    let Some(delta) = get(event, "delta") else {
        return DecodedEvent::Unknown;
    };
    let decoded = match get_str(delta, "type") {
        Some("text_delta") => StreamDelta::Text(get_str(delta, "text").unwrap_or("").to_string()),
        Some("thinking_delta") => {
            StreamDelta::Thinking(get_str(delta, "thinking").unwrap_or("").to_string())
        }
        Some("signature_delta") => {
            StreamDelta::Signature(get_str(delta, "signature").unwrap_or("").to_string())
        }
        Some("input_json_delta") => {
            StreamDelta::InputJson(get_str(delta, "partial_json").unwrap_or("").to_string())
        }
        _ => return DecodedEvent::Unknown,
    };
    DecodedEvent::StreamBlockDelta {
        index: index as u32,
        delta: decoded,
    }
}

fn decode_assistant(json: &Value) -> DecodedEvent {
    let Some(message) = get(json, "message") else {
        return DecodedEvent::Unknown;
    };
    let is_api_error = get_bool(json, "isApiError") || get_bool(message, "isApiError");
    if is_api_error {
        return decode_api_error(message);
    }

    let message_id = get_str(message, "id").unwrap_or_default().to_string();
    let content = get(message, "content")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(decode_content_block).collect())
        .unwrap_or_default();
    let usage = decode_usage(message.get("usage"));
    let stop_reason = get_str(message, "stop_reason").map(String::from);

    DecodedEvent::AssistantComplete(AssistantComplete {
        message_id,
        content,
        usage,
        stop_reason,
    })
}

fn decode_api_error(message: &Value) -> DecodedEvent {
    let raw = get(message, "content")
        .and_then(Value::as_array)
        .and_then(|arr| arr.iter().find(|b| get_str(b, "type") == Some("text")))
        .and_then(|b| get_str(b, "text"))
        .unwrap_or("API Error: unknown")
        .to_string();

    let decoded = raw
        .strip_prefix("API Error: ")
        .and_then(|rest| {
            let json_start = rest.find('{')?;
            let (_code, body) = rest.split_at(json_start);
            serde_json::from_str::<Value>(body).ok()
        })
        .and_then(|v| {
            get_str(&v, "message")
                .map(String::from)
                .or_else(|| get(&v, "error").and_then(|e| get_str(e, "message")).map(String::from))
        })
        .unwrap_or(raw);

    DecodedEvent::ApiErrorAssistant { message: decoded }
}

fn decode_content_block(block: &Value) -> Option<ContentBlock> {
    match get_str(block, "type")? {
        "text" => Some(ContentBlock::Text {
            text: get_str(block, "text").unwrap_or("").to_string(),
        }),
        "thinking" => Some(ContentBlock::Thinking {
            text: get_str(block, "thinking").unwrap_or("").to_string(),
            signature: get_str(block, "signature").map(String::from),
        }),
        "tool_use" => Some(ContentBlock::ToolUse {
            id: get_str(block, "id")?.to_string(),
            name: get_str(block, "name")?.to_string(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

fn decode_usage(usage: Option<&Value>) -> gueridon_core::Usage {
    let Some(usage) = usage else {
        return gueridon_core::Usage::default();
    };
    gueridon_core::Usage {
        input_tokens: get_u64(usage, "input_tokens").unwrap_or(0),
        output_tokens: get_u64(usage, "output_tokens").unwrap_or(0),
        cache_read_tokens: get_u64(usage, "cache_read_input_tokens").unwrap_or(0),
        cache_creation_tokens: get_u64(usage, "cache_creation_input_tokens").unwrap_or(0),
    }
}

fn decode_user(json: &Value) -> DecodedEvent {
    let Some(message) = get(json, "message") else {
        return DecodedEvent::Unknown;
    };
    let Some(content) = get(message, "content") else {
        return DecodedEvent::Unknown;
    };

    if let Some(text) = content.as_str() {
        return DecodedEvent::UserText {
            text: text.to_string(),
        };
    }

    let Some(items) = content.as_array() else {
        return DecodedEvent::Unknown;
    };

    let mut tool_results = Vec::new();
    let mut text_parts = Vec::new();
    for item in items {
        match get_str(item, "type") {
            Some("tool_result") => {
                if let Some(r) = decode_tool_result(item) {
                    tool_results.push(r);
                }
            }
            Some("text") => {
                if let Some(t) = get_str(item, "text") {
                    text_parts.push(t.to_string());
                }
            }
            _ => {}
        }
    }

    if !tool_results.is_empty() {
        DecodedEvent::ToolResults(tool_results)
    } else if !text_parts.is_empty() {
        DecodedEvent::UserText {
            text: text_parts.join("\n"),
        }
    } else {
        DecodedEvent::Unknown
    }
}

fn decode_tool_result(item: &Value) -> Option<DecodedToolResult> {
    let tool_use_id = get_str(item, "tool_use_id")?.to_string();
    let is_error = get_bool(item, "is_error");
    let content = item.get("content")?;
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|b| get_str(b, "type") == Some("text"))
            .filter_map(|b| get_str(b, "text"))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    Some(DecodedToolResult {
        tool_use_id,
        text,
        is_error,
    })
}

fn decode_turn_result(json: &Value) -> TurnResult {
    let subtype = match get_str(json, "subtype") {
        Some("success") => Some(TurnSubtype::Success),
        Some("aborted") => Some(TurnSubtype::Aborted),
        Some("error_max_turns") => Some(TurnSubtype::ErrorMaxTurns),
        Some("error") => Some(TurnSubtype::Error),
        _ => None,
    };

    let usage_by_model = get(json, "modelUsage")
        .or_else(|| get(json, "model_usage"))
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(model, usage)| (model.clone(), decode_model_usage(usage)))
                .collect()
        })
        .unwrap_or_default();

    let summary = get_str(json, "result").map(String::from);

    TurnResult {
        subtype,
        usage_by_model,
        summary,
    }
}

fn decode_model_usage(usage: &Value) -> ModelUsage {
    ModelUsage {
        context_window: get_u64(usage, "contextWindow")
            .or_else(|| get_u64(usage, "context_window"))
            .unwrap_or(0),
        cost_usd: usage
            .get("costUsd")
            .or_else(|| usage.get("cost_usd"))
            .and_then(Value::as_f64),
        input_tokens: get_u64(usage, "inputTokens")
            .or_else(|| get_u64(usage, "input_tokens"))
            .unwrap_or(0),
        output_tokens: get_u64(usage, "outputTokens")
            .or_else(|| get_u64(usage, "output_tokens"))
            .unwrap_or(0),
        cache_read_tokens: get_u64(usage, "cacheReadTokens")
            .or_else(|| get_u64(usage, "cache_read_tokens"))
            .unwrap_or(0),
        cache_creation_tokens: get_u64(usage, "cacheCreationTokens")
            .or_else(|| get_u64(usage, "cache_creation_tokens"))
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_system_init() {
        let v = json!({"type":"system","subtype":"init","model":"m","session_id":"s1","cwd":"/x"});
        let DecodedEvent::SystemInit(init) = decode_event(&v) else {
            panic!("expected SystemInit");
        };
        assert_eq!(init.model.as_deref(), Some("m"));
        assert_eq!(init.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn decodes_stream_text_delta() {
        let v = json!({"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello "}}});
        assert_eq!(
            decode_event(&v),
            DecodedEvent::StreamBlockDelta {
                index: 0,
                delta: StreamDelta::Text("Hello ".to_string()),
            }
        );
    }

    #[test]
    fn decodes_tool_use_block_start() {
        let v = json!({"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"shell"}}});
        assert_eq!(
            decode_event(&v),
            DecodedEvent::StreamBlockStart {
                index: 0,
                kind: BlockKind::ToolUse,
                id: Some("t1".into()),
                name: Some("shell".into()),
            }
        );
    }

    #[test]
    fn decodes_assistant_complete_with_tool_use() {
        let v = json!({"type":"assistant","message":{"id":"m1","content":[{"type":"tool_use","id":"t1","name":"shell","input":{"command":"ls -la"}}],"usage":{"input_tokens":10,"output_tokens":2}}});
        let DecodedEvent::AssistantComplete(ac) = decode_event(&v) else {
            panic!("expected AssistantComplete");
        };
        assert_eq!(ac.message_id, "m1");
        assert_eq!(ac.usage.input_tokens, 10);
        assert!(matches!(&ac.content[0], ContentBlock::ToolUse { name, .. } if name == "shell"));
    }

    #[test]
    fn decodes_api_error_with_embedded_json() {
        let v = json!({"type":"assistant","isApiError":true,"message":{"content":[{"type":"text","text":"API Error: 529 {\"message\":\"Overloaded\"}"}]}});
        assert_eq!(
            decode_event(&v),
            DecodedEvent::ApiErrorAssistant {
                message: "Overloaded".to_string()
            }
        );
    }

    #[test]
    fn api_error_falls_back_to_raw_text_on_parse_failure() {
        let v = json!({"type":"assistant","isApiError":true,"message":{"content":[{"type":"text","text":"API Error: not json at all"}]}});
        let DecodedEvent::ApiErrorAssistant { message } = decode_event(&v) else {
            panic!("expected ApiErrorAssistant");
        };
        assert_eq!(message, "API Error: not json at all");
    }

    #[test]
    fn decodes_user_string_as_text() {
        let v = json!({"type":"user","message":{"content":"hi there"}});
        assert_eq!(
            decode_event(&v),
            DecodedEvent::UserText {
                text: "hi there".to_string()
            }
        );
    }

    #[test]
    fn decodes_user_tool_results() {
        let v = json!({"type":"user","message":{"content":[
            {"type":"tool_result","tool_use_id":"t1","content":"file1\nfile2"},
            {"type":"tool_result","tool_use_id":"t2","content":[{"type":"text","text":"ok"}],"is_error":true}
        ]}});
        let DecodedEvent::ToolResults(results) = decode_event(&v) else {
            panic!("expected ToolResults");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_use_id, "t1");
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert_eq!(results[1].text, "ok");
    }

    #[test]
    fn decodes_turn_result_with_model_usage() {
        let v = json!({"type":"result","subtype":"success","modelUsage":{"m":{"contextWindow":200000}}});
        let DecodedEvent::TurnResult(tr) = decode_event(&v) else {
            panic!("expected TurnResult");
        };
        assert_eq!(tr.subtype, Some(TurnSubtype::Success));
        assert_eq!(tr.context_window_or_default(), 200_000);
    }

    #[test]
    fn turn_result_defaults_window_to_200k_when_absent() {
        let tr = TurnResult::default();
        assert_eq!(tr.context_window_or_default(), 200_000);
    }

    #[test]
    fn non_json_line_type_is_unknown() {
        let v = json!({"type":"something-unheard-of"});
        assert_eq!(decode_event(&v), DecodedEvent::Unknown);
    }

    #[test]
    fn block_stop_without_index_is_unknown() {
        let v = json!({"type":"stream_event","event":{"type":"content_block_stop"}});
        assert_eq!(decode_event(&v), DecodedEvent::Unknown);
    }
}
