//! OpenAI-compatible SSE stream parsing.
//!
//! Feed it raw `data:` lines one at a time: it accumulates text and grows a
//! vector of tool-call builders keyed by the wire's `index` field, and
//! `[DONE]` flips a flag the caller polls.

use serde_json::Value;

use crate::error::GatewayResult;

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// A tool call as it was actually emitted on the wire, arguments still a raw
/// (possibly malformed) JSON string — parsing is the caller's job, since a
/// parse failure here is not fatal to the loop.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    pub raw_arguments: String,
}

/// Accumulates one streamed chat-completion turn.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_call_builders: Vec<ToolCallBuilder>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one line of the SSE body. Returns `Some(delta)` if this line
    /// carried a text-content fragment, `None` otherwise (tool-call
    /// fragments, blank lines, comments, and `[DONE]` all return `None`).
    pub fn feed_line(&mut self, line: &str) -> GatewayResult<Option<String>> {
        let line = line.trim();
        if line.is_empty() || !line.starts_with("data:") {
            return Ok(None);
        }

        let payload = line["data:".len()..].trim();
        if payload == "[DONE]" {
            self.done = true;
            return Ok(None);
        }
        if payload.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(payload)?;
        let delta = &value["choices"][0]["delta"];

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                self.text.push_str(content);
                return Ok(Some(content.to_string()));
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for tc in tool_calls {
                let index = tc.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                while self.tool_call_builders.len() <= index {
                    self.tool_call_builders.push(ToolCallBuilder::default());
                }
                let builder = &mut self.tool_call_builders[index];

                if let Some(id) = tc.get("id").and_then(Value::as_str) {
                    builder.id = Some(id.to_string());
                }
                if let Some(function) = tc.get("function") {
                    if let Some(name) = function.get("name").and_then(Value::as_str) {
                        builder.name.push_str(name);
                    }
                    if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                        builder.arguments.push_str(args);
                    }
                }
            }
        }

        Ok(None)
    }

    /// Consume the accumulator, returning the accumulated text and any tool
    /// calls in wire order.
    pub fn into_parts(self) -> (String, Vec<ParsedToolCall>) {
        let tool_calls = self
            .tool_call_builders
            .into_iter()
            .enumerate()
            .filter(|(_, b)| !b.name.is_empty() || b.id.is_some())
            .map(|(i, b)| ParsedToolCall {
                id: b.id.unwrap_or_else(|| format!("call_{i}")),
                name: b.name,
                raw_arguments: b.arguments,
            })
            .collect();
        (self.text, tool_calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_text_deltas() {
        let mut acc = StreamAccumulator::new();
        let d1 = acc
            .feed_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#)
            .unwrap();
        let d2 = acc
            .feed_line(r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#)
            .unwrap();
        assert_eq!(d1.as_deref(), Some("Hel"));
        assert_eq!(d2.as_deref(), Some("lo"));

        let (text, calls) = acc.into_parts();
        assert_eq!(text, "Hello");
        assert!(calls.is_empty());
    }

    #[test]
    fn done_sentinel_sets_flag() {
        let mut acc = StreamAccumulator::new();
        assert!(!acc.is_done());
        acc.feed_line("data: [DONE]").unwrap();
        assert!(acc.is_done());
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.feed_line("").unwrap(), None);
        assert_eq!(acc.feed_line(": keep-alive").unwrap(), None);
    }

    #[test]
    fn accumulates_single_tool_call() {
        let mut acc = StreamAccumulator::new();
        acc.feed_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_recent_labs","arguments":""}}]}}]}"#,
        )
        .unwrap();
        acc.feed_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"days\""}}]}}]}"#,
        )
        .unwrap();
        acc.feed_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":30}"}}]}}]}"#,
        )
        .unwrap();

        let (text, calls) = acc.into_parts();
        assert!(text.is_empty());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_recent_labs");
        assert_eq!(calls[0].raw_arguments, r#"{"days":30}"#);
    }

    #[test]
    fn accumulates_multiple_tool_calls_by_index() {
        let mut acc = StreamAccumulator::new();
        acc.feed_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"get_recent_labs","arguments":"{}"}}]}}]}"#,
        )
        .unwrap();
        acc.feed_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"get_symptom_timeline","arguments":"{}"}}]}}]}"#,
        )
        .unwrap();

        let (_, calls) = acc.into_parts();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_recent_labs");
        assert_eq!(calls[1].name, "get_symptom_timeline");
    }

    #[test]
    fn empty_stream_yields_no_text_and_no_tool_calls() {
        let acc = StreamAccumulator::new();
        let (text, calls) = acc.into_parts();
        assert!(text.is_empty());
        assert!(calls.is_empty());
    }

    #[test]
    fn invalid_json_payload_is_an_error() {
        let mut acc = StreamAccumulator::new();
        let err = acc.feed_line("data: {not json}").unwrap_err();
        assert!(matches!(err, crate::error::GatewayError::Json(_)));
    }
}
