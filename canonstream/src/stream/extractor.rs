// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Text extractor
//
// The same logical text arrives in many envelope shapes depending on
// model family and API generation. Each shape is recognized by one
// independent probe; probes are tried in a fixed order and the first
// structural match wins. Supporting a new protocol means appending a
// probe, never editing an existing one.

use serde_json::Value;

use super::types::ExtractedFragment;

/// Default `type` prefix for deliberation-trace events.
pub const DEFAULT_REASONING_PREFIXES: &[&str] = &["response.reasoning"];

/// Field names that carry text inside nested chat-completion content.
const TEXT_FIELDS: &[&str] = &["text", "content", "value", "output_text"];

// ---------------------------------------------------------------------------
// Trait: TextProbe
// ---------------------------------------------------------------------------

/// Recognizes one upstream payload shape.
///
/// Returns `None` when the payload does not have this shape, so the next
/// probe gets a chance.
pub trait TextProbe: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
    fn probe(&self, payload: &Value) -> Option<ExtractedFragment>;
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Ordered list of probes.
pub struct TextExtractor {
    probes: Vec<Box<dyn TextProbe>>,
}

impl TextExtractor {
    /// An extractor with no probes. Everything extracts to `None`.
    pub fn empty() -> Self {
        Self { probes: Vec::new() }
    }

    /// The standard probe order for all known upstream shapes.
    pub fn standard() -> Self {
        Self::with_reasoning_prefixes(
            DEFAULT_REASONING_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        )
    }

    /// Standard probes, with custom reasoning tag prefixes.
    pub fn with_reasoning_prefixes(prefixes: Vec<String>) -> Self {
        Self::empty()
            .with_probe(FlatTextProbe)
            .with_probe(ReasoningProbe::new(prefixes))
            .with_probe(TaggedDeltaProbe)
            .with_probe(CompletedSnapshotProbe)
            .with_probe(ChatCompletionProbe)
            .with_probe(LegacyFieldProbe)
    }

    /// Append a probe after all existing ones.
    pub fn with_probe(mut self, probe: impl TextProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Names of installed probes, in trial order.
    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Run the probes in order and return the first match.
    pub fn extract(&self, payload: &Value) -> Option<ExtractedFragment> {
        self.probes.iter().find_map(|p| p.probe(payload))
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("probes", &self.probe_names())
            .finish()
    }
}

fn type_tag(payload: &Value) -> Option<&str> {
    payload.get("type").and_then(|t| t.as_str())
}

// ---------------------------------------------------------------------------
// 1. Flat text field
// ---------------------------------------------------------------------------

/// `{"response": "..."}`, as sent by Workers AI and Ollama generate.
///
/// Only untagged payloads qualify; a `type` field means some other
/// protocol owns the shape.
pub struct FlatTextProbe;

impl TextProbe for FlatTextProbe {
    fn name(&self) -> &'static str {
        "flat_text"
    }

    fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
        if payload.get("type").is_some() {
            return None;
        }
        payload
            .get("response")
            .and_then(|r| r.as_str())
            .map(ExtractedFragment::delta)
    }
}

// ---------------------------------------------------------------------------
// 2. Reasoning traces
// ---------------------------------------------------------------------------

/// Deliberation traces, classified as reasoning whatever text they carry.
///
/// - Responses API: `type` starting with `response.reasoning`
/// - Anthropic: `content_block_delta` with `thinking_delta` / `signature_delta`,
///   and `content_block_start` opening a `thinking` block
pub struct ReasoningProbe {
    prefixes: Vec<String>,
}

impl ReasoningProbe {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }
}

impl TextProbe for ReasoningProbe {
    fn name(&self) -> &'static str {
        "reasoning"
    }

    fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
        let tag = type_tag(payload)?;

        if self.prefixes.iter().any(|p| tag.starts_with(p.as_str())) {
            let text = payload
                .get("delta")
                .or_else(|| payload.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            return Some(ExtractedFragment::reasoning(text));
        }

        match tag {
            "content_block_delta" => {
                let delta = payload.get("delta")?;
                match type_tag(delta)? {
                    "thinking_delta" | "signature_delta" => {
                        let text = delta.get("thinking").and_then(|t| t.as_str()).unwrap_or("");
                        Some(ExtractedFragment::reasoning(text))
                    }
                    _ => None,
                }
            }
            "content_block_start" => {
                let block = payload.get("content_block")?;
                match type_tag(block)? {
                    "thinking" | "redacted_thinking" => {
                        let text = block.get("thinking").and_then(|t| t.as_str()).unwrap_or("");
                        Some(ExtractedFragment::reasoning(text))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Tagged text deltas
// ---------------------------------------------------------------------------

/// Tagged incremental text.
///
/// - Responses API: `{"type":"response.output_text.delta","delta":"..."}`
/// - Anthropic: `{"type":"content_block_delta","delta":{"type":"text_delta","text":"..."}}`
pub struct TaggedDeltaProbe;

impl TextProbe for TaggedDeltaProbe {
    fn name(&self) -> &'static str {
        "tagged_delta"
    }

    fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
        match type_tag(payload)? {
            "response.output_text.delta" => payload
                .get("delta")
                .and_then(|d| d.as_str())
                .map(ExtractedFragment::delta),
            "content_block_delta" => {
                let delta = payload.get("delta")?;
                if type_tag(delta)? != "text_delta" {
                    return None;
                }
                delta
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(ExtractedFragment::delta)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Completed-response snapshots
// ---------------------------------------------------------------------------

/// `{"type":"response.completed","response":{"output":[...]}}`
///
/// Concatenates every text leaf of every non-reasoning output item, in
/// document order, into one terminal snapshot.
pub struct CompletedSnapshotProbe;

impl TextProbe for CompletedSnapshotProbe {
    fn name(&self) -> &'static str {
        "completed_snapshot"
    }

    fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
        match type_tag(payload)? {
            "response.completed" | "response.done" => {}
            _ => return None,
        }
        let output = payload
            .get("response")
            .and_then(|r| r.get("output"))
            .and_then(|o| o.as_array())?;

        let mut text = String::new();
        for item in output {
            if type_tag(item).is_some_and(|t| t.starts_with("reasoning")) {
                continue;
            }
            match item.get("content") {
                Some(Value::Array(parts)) => {
                    for part in parts {
                        if type_tag(part).is_some_and(|t| t.starts_with("reasoning")) {
                            continue;
                        }
                        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                            text.push_str(t);
                        }
                    }
                }
                Some(Value::String(s)) => text.push_str(s),
                _ => {
                    if let Some(t) = item.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
            }
        }
        Some(ExtractedFragment::snapshot(text))
    }
}

// ---------------------------------------------------------------------------
// 5. Chat completions
// ---------------------------------------------------------------------------

/// `{"choices":[{"delta":{"content": ...}}]}`
///
/// `content` may be a string, or an array/object of parts that needs
/// unwrapping. A delta with no `content` (role-only, reasoning_content,
/// tool calls) is not a match.
pub struct ChatCompletionProbe;

impl TextProbe for ChatCompletionProbe {
    fn name(&self) -> &'static str {
        "chat_completion"
    }

    fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
        let content = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))?;

        match content {
            Value::Null => None,
            other => Some(ExtractedFragment::delta(unwrap_text(other))),
        }
    }
}

/// Recursively pull text out of a content value.
///
/// Arrays concatenate their children; objects are searched through the
/// known text-bearing field names. Anything else contributes nothing:
/// opaque structures are never stringified into the output.
pub fn unwrap_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(unwrap_text).collect(),
        Value::Object(map) => {
            if map
                .get("type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| t.starts_with("reasoning") || t == "thinking")
            {
                return String::new();
            }
            TEXT_FIELDS
                .iter()
                .find_map(|field| map.get(*field))
                .map(unwrap_text)
                .unwrap_or_default()
        }
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// 6. Legacy field paths
// ---------------------------------------------------------------------------

/// Field paths from older or alternate protocol versions.
///
/// Responses-API lifecycle events (`response.output_text.done`,
/// `response.content_part.done`, ...) repeat text that was already
/// streamed, so anything tagged `response.` is skipped here.
pub struct LegacyFieldProbe;

impl LegacyFieldProbe {
    const PATHS: &'static [&'static [&'static str]] = &[
        // Legacy completions
        &["choices", "0", "text"],
        // Ollama chat
        &["message", "content"],
        // Text Generation Inference
        &["token", "text"],
        &["generated_text"],
        &["output_text"],
        &["text"],
        &["delta", "text"],
        // Legacy Anthropic text completions
        &["completion"],
        &["content"],
    ];
}

impl TextProbe for LegacyFieldProbe {
    fn name(&self) -> &'static str {
        "legacy_field"
    }

    fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
        if type_tag(payload).is_some_and(|t| t.starts_with("response.")) {
            return None;
        }
        Self::PATHS.iter().find_map(|path| {
            let mut node = payload;
            for segment in *path {
                node = match segment.parse::<usize>() {
                    Ok(index) => node.get(index)?,
                    Err(_) => node.get(*segment)?,
                };
            }
            node.as_str().map(ExtractedFragment::delta)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::FragmentKind;
    use serde_json::json;

    fn extract(payload: Value) -> Option<ExtractedFragment> {
        TextExtractor::standard().extract(&payload)
    }

    #[test]
    fn standard_probe_order() {
        assert_eq!(
            TextExtractor::standard().probe_names(),
            vec![
                "flat_text",
                "reasoning",
                "tagged_delta",
                "completed_snapshot",
                "chat_completion",
                "legacy_field"
            ]
        );
    }

    #[test]
    fn flat_response_field() {
        assert_eq!(
            extract(json!({"response": "Hello"})),
            Some(ExtractedFragment::delta("Hello"))
        );
    }

    #[test]
    fn reasoning_tag_outranks_string_field() {
        let payload = json!({
            "type": "response.reasoning_summary_text.delta",
            "response": "thinking out loud",
            "delta": "thinking out loud"
        });
        let fragment = extract(payload).expect("should classify");
        assert_eq!(fragment.kind, FragmentKind::Reasoning);
    }

    #[test]
    fn anthropic_thinking_delta_is_reasoning() {
        let payload = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "thinking_delta", "thinking": "hmm"}
        });
        assert_eq!(extract(payload), Some(ExtractedFragment::reasoning("hmm")));
    }

    #[test]
    fn responses_api_text_delta() {
        let payload = json!({"type": "response.output_text.delta", "delta": "Hi"});
        assert_eq!(extract(payload), Some(ExtractedFragment::delta("Hi")));
    }

    #[test]
    fn anthropic_text_delta() {
        let payload = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": " world"}
        });
        assert_eq!(extract(payload), Some(ExtractedFragment::delta(" world")));
    }

    #[test]
    fn anthropic_control_events_carry_nothing() {
        assert_eq!(extract(json!({"type": "message_stop"})), None);
        assert_eq!(extract(json!({"type": "content_block_stop", "index": 0})), None);
        assert_eq!(
            extract(json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": {"type": "text", "text": ""}
            })),
            None
        );
    }

    #[test]
    fn completed_snapshot_concatenates_leaves_in_order() {
        let payload = json!({
            "type": "response.completed",
            "response": {
                "output": [
                    {"type": "reasoning", "summary": [{"type": "summary_text", "text": "secret"}]},
                    {"type": "message", "content": [
                        {"type": "output_text", "text": "Hello"},
                        {"type": "output_text", "text": ", world"}
                    ]},
                    {"type": "message", "content": [{"type": "output_text", "text": "!"}]}
                ]
            }
        });
        assert_eq!(
            extract(payload),
            Some(ExtractedFragment::snapshot("Hello, world!"))
        );
    }

    #[test]
    fn chat_completion_string_content() {
        let payload = json!({"choices": [{"index": 0, "delta": {"content": "Hey"}}]});
        assert_eq!(extract(payload), Some(ExtractedFragment::delta("Hey")));
    }

    #[test]
    fn chat_completion_nested_content_is_unwrapped() {
        let payload = json!({"choices": [{"delta": {"content": [
            {"type": "text", "text": "a"},
            {"type": "text", "text": {"value": "b"}},
            {"type": "image_url", "image_url": {"url": "http://x"}},
            42
        ]}}]});
        assert_eq!(extract(payload), Some(ExtractedFragment::delta("ab")));
    }

    #[test]
    fn opaque_structures_never_stringified() {
        let payload = json!({"choices": [{"delta": {"content": {"unknown": {"deep": 1}}}}]});
        let fragment = extract(payload).expect("should match chat shape");
        assert_eq!(fragment.text, "");
        assert!(!fragment.text.contains("object"));
    }

    #[test]
    fn role_only_chat_delta_is_not_text() {
        let payload = json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert_eq!(extract(payload), None);
    }

    #[test]
    fn reasoning_content_field_is_not_text() {
        let payload = json!({"choices": [{"delta": {"content": null, "reasoning_content": "plan"}}]});
        assert_eq!(extract(payload), None);
    }

    #[test]
    fn legacy_paths() {
        assert_eq!(
            extract(json!({"choices": [{"text": "old"}]})),
            Some(ExtractedFragment::delta("old"))
        );
        assert_eq!(
            extract(json!({"message": {"role": "assistant", "content": "ollama"}, "done": false})),
            Some(ExtractedFragment::delta("ollama"))
        );
        assert_eq!(
            extract(json!({"token": {"id": 1, "text": "tgi"}})),
            Some(ExtractedFragment::delta("tgi"))
        );
        assert_eq!(
            extract(json!({"generated_text": "done"})),
            Some(ExtractedFragment::delta("done"))
        );
    }

    #[test]
    fn responses_api_done_events_do_not_echo_text() {
        let payload = json!({"type": "response.output_text.done", "text": "full answer"});
        assert_eq!(extract(payload), None);
    }

    #[test]
    fn unrecognized_shape_is_none() {
        assert_eq!(extract(json!({"usage": {"tokens": 3}})), None);
        assert_eq!(extract(json!([1, 2, 3])), None);
        assert_eq!(extract(json!("bare string")), None);
    }

    #[test]
    fn appended_probe_runs_after_standard_ones() {
        struct Shout;
        impl TextProbe for Shout {
            fn name(&self) -> &'static str {
                "shout"
            }
            fn probe(&self, payload: &Value) -> Option<ExtractedFragment> {
                payload
                    .get("shout")
                    .and_then(|s| s.as_str())
                    .map(|s| ExtractedFragment::delta(s.to_uppercase()))
            }
        }

        let extractor = TextExtractor::standard().with_probe(Shout);
        assert_eq!(
            extractor.extract(&json!({"shout": "hey"})),
            Some(ExtractedFragment::delta("HEY"))
        );
        // Earlier probes still win.
        assert_eq!(
            extractor.extract(&json!({"shout": "hey", "response": "calm"})),
            Some(ExtractedFragment::delta("calm"))
        );
    }
}
