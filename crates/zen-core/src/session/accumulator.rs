//! Stream accumulator
//!
//! Collects the text and the fragmented tool calls of a single model
//! response. Fragments are keyed by the position index the provider assigns;
//! calls come out in ascending index order once the stream has ended.

use std::collections::BTreeMap;

use crate::provider::StreamDelta;
use crate::session::context::ToolCall;

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Text and finalized calls of one model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AccumulatedTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: BTreeMap<usize, ToolCallBuilder>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &StreamDelta) {
        if let Some(text) = &delta.text {
            self.text.push_str(text);
        }

        for fragment in &delta.tool_calls {
            let call = self.calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
                call.id = Some(id.to_string());
            }
            if let Some(name) = &fragment.name {
                call.name.push_str(name);
            }
            if let Some(arguments) = &fragment.arguments {
                call.arguments.push_str(arguments);
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Finalize, consuming the accumulator
    pub fn finish(self) -> AccumulatedTurn {
        let tool_calls = self
            .calls
            .into_iter()
            .map(|(index, call)| ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", index)),
                name: call.name,
                arguments: call.arguments,
            })
            .collect();

        AccumulatedTurn {
            text: self.text,
            tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolCallDelta;

    fn fragment(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamDelta {
        StreamDelta {
            text: None,
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(String::from),
                name: name.map(String::from),
                arguments: args.map(String::from),
            }],
        }
    }

    /// Split `s` into `n` chunks of roughly equal size on char boundaries
    fn split_into(s: &str, n: usize) -> Vec<String> {
        let chars: Vec<char> = s.chars().collect();
        let size = chars.len().div_ceil(n).max(1);
        chars.chunks(size).map(|c| c.iter().collect()).collect()
    }

    #[test]
    fn test_text_only() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamDelta::text("Hello, "));
        acc.push(&StreamDelta::text("world"));
        let turn = acc.finish();
        assert_eq!(turn.text, "Hello, world");
        assert!(!turn.has_tool_calls());
    }

    #[test]
    fn test_fragmented_call_reassembles_for_any_split() {
        let name = "execute_shell";
        let args = r#"{"command": "ls -la | grep \"é\""}"#;

        for n in 1..=args.len() {
            let mut acc = StreamAccumulator::new();
            acc.push(&fragment(0, Some("call_abc"), None, None));
            for part in split_into(name, n.min(name.len())) {
                acc.push(&fragment(0, None, Some(&part), None));
            }
            for part in split_into(args, n) {
                acc.push(&fragment(0, None, None, Some(&part)));
            }

            let turn = acc.finish();
            assert_eq!(turn.tool_calls.len(), 1, "split into {n}");
            assert_eq!(turn.tool_calls[0].id, "call_abc");
            assert_eq!(turn.tool_calls[0].name, name);
            assert_eq!(turn.tool_calls[0].arguments, args);
        }
    }

    #[test]
    fn test_interleaved_indices_sorted() {
        let mut acc = StreamAccumulator::new();
        acc.push(&fragment(1, Some("b"), Some("write_file"), Some("{\"pa")));
        acc.push(&fragment(0, Some("a"), Some("read_file"), Some("{}")));
        acc.push(&fragment(1, None, None, Some("th\":\"x\"}")));

        let turn = acc.finish();
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].name, "read_file");
        assert_eq!(turn.tool_calls[1].id, "b");
        assert_eq!(turn.tool_calls[1].arguments, r#"{"path":"x"}"#);
    }

    #[test]
    fn test_later_id_replaces_and_missing_id_synthesized() {
        let mut acc = StreamAccumulator::new();
        acc.push(&fragment(0, Some("first"), Some("a"), None));
        acc.push(&fragment(0, Some(""), None, None));
        acc.push(&fragment(0, Some("second"), None, None));
        acc.push(&fragment(3, None, Some("b"), None));

        let turn = acc.finish();
        assert_eq!(turn.tool_calls[0].id, "second");
        assert_eq!(turn.tool_calls[1].id, "call_3");
    }
}
