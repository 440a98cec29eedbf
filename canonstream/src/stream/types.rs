// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Core types shared by the pipeline stages: reassembled events,
// extracted fragments, gate decisions, operating modes, and errors.

use std::fmt;

/// Literal upstream end-of-stream sentinel. Never decoded, never forwarded.
pub const DONE_SENTINEL: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Reassembled events
// ---------------------------------------------------------------------------

/// One upstream SSE event, reassembled from arbitrary byte chunks.
///
/// Only `data` lines carry payload. `event`, `id` and `retry` are kept for
/// logging but play no part in extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalEvent {
    /// The `event:` name, if present (Anthropic and Responses-API streams).
    pub event: Option<String>,
    /// The `id:` field, if present.
    pub id: Option<String>,
    /// The `retry:` hint in milliseconds, if present and numeric.
    pub retry: Option<u64>,
    /// Every `data:` line of the event, in arrival order.
    pub data: Vec<String>,
}

impl LogicalEvent {
    /// True if the event carried no fields at all.
    pub fn is_empty(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.retry.is_none() && self.data.is_empty()
    }

    /// Data lines concatenated with no separator.
    ///
    /// Some providers split one JSON document across consecutive `data:`
    /// lines at arbitrary points, including inside string literals.
    pub fn payload(&self) -> String {
        self.data.concat()
    }

    /// Data lines joined with `\n`, the standard SSE reading.
    pub fn payload_joined(&self) -> String {
        self.data.join("\n")
    }

    /// True if the payload is the end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        self.payload().trim() == DONE_SENTINEL
    }
}

// ---------------------------------------------------------------------------
// Extracted fragments
// ---------------------------------------------------------------------------

/// How an extracted fragment relates to the visible answer.
///
/// Derived only from the payload's own shape or tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// The newest piece of visible output.
    IncrementalDelta,
    /// The complete accumulated output, sent once at completion.
    TerminalSnapshot,
    /// Internal deliberation. Never forwarded.
    Reasoning,
}

/// Text pulled out of one upstream payload, with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFragment {
    pub text: String,
    pub kind: FragmentKind,
}

impl ExtractedFragment {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FragmentKind::IncrementalDelta,
        }
    }

    pub fn snapshot(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FragmentKind::TerminalSnapshot,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FragmentKind::Reasoning,
        }
    }
}

// ---------------------------------------------------------------------------
// Gate decisions
// ---------------------------------------------------------------------------

/// Why the gate held a fragment back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Internal deliberation text.
    Reasoning,
    /// A terminal snapshot that repeats what was already streamed.
    RedundantSnapshot,
    /// A terminal snapshot that does not contain what was already streamed.
    DivergentSnapshot,
    /// Ellipsis-only filler before the final answer opened.
    Placeholder,
    /// A leaked role or stage-direction label before the final answer opened.
    RolePrefix,
    /// Nothing to show.
    Empty,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::Reasoning => "reasoning",
            SuppressReason::RedundantSnapshot => "redundant_snapshot",
            SuppressReason::DivergentSnapshot => "divergent_snapshot",
            SuppressReason::Placeholder => "placeholder",
            SuppressReason::RolePrefix => "role_prefix",
            SuppressReason::Empty => "empty",
        }
    }
}

/// Outcome of gating one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Forward this text now; it has been appended to the visible text.
    Emit(String),
    /// Forward nothing.
    Suppress(SuppressReason),
    /// A snapshot superseded the streamed text. `tail` is the part of it
    /// the client has not been sent yet.
    Replace { snapshot: String, tail: String },
}

// ---------------------------------------------------------------------------
// Operating mode
// ---------------------------------------------------------------------------

/// Whether the consumer wants the canonical stream or the raw upstream bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    #[default]
    Normalize,
    Passthrough,
}

impl StreamMode {
    /// Parse a mode flag. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normalize" | "canonical" => Some(StreamMode::Normalize),
            "passthrough" | "verbatim" | "raw" => Some(StreamMode::Passthrough),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Normalize => "normalize",
            StreamMode::Passthrough => "passthrough",
        }
    }
}

/// What to do with a payload that is not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadStrictness {
    /// Drop the event.
    #[default]
    Discard,
    /// Treat the raw payload text as an incremental delta.
    Literal,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of the upstream byte stream itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream transport failed: {0}")]
    Transport(String),
    #[error("upstream timed out: {0}")]
    Timeout(String),
}

/// Errors surfaced by the stream pipeline to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The upstream stream broke after streaming began.
    Upstream(UpstreamError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Upstream(e) => write!(f, "stream processing failed: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Message safe to show to the end user.
    pub fn public_message(&self) -> &'static str {
        "stream processing failed"
    }
}
