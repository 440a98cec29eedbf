// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Gate / dedup filter
//
// Decides per fragment whether to emit it, suppress it, or use it to
// replace what was already shown. Upstreams told to think before
// answering leak self-talk before the answer and repeat the whole answer
// at completion; this is where both are caught. It must never drop real
// answer content and never forward reasoning.

use crate::config::{default_role_prefix_patterns, CompiledPattern};

use super::types::{ExtractedFragment, FragmentKind, GateDecision, SuppressReason};

/// Default in-band marker opening the user-facing answer.
pub const DEFAULT_FINAL_MARKER: &str = "<final>";

/// Default extra visible characters a snapshot may carry and still count
/// as an echo of the streamed text.
pub const DEFAULT_SNAPSHOT_SLACK_CHARS: usize = 2;

/// Default size of the trailing window scanned for the final marker.
pub const DEFAULT_MARKER_WINDOW_CHARS: usize = 64;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Slack for the snapshot echo test, in non-whitespace characters.
    /// A heuristic, not a protocol guarantee.
    pub snapshot_slack_chars: usize,
    /// Marker that opens the final answer. `None` means the stream is
    /// treated as final from the first fragment. The marker is part of the
    /// visible text and reaches the client unchanged; it may arrive split
    /// across events.
    pub final_marker: Option<String>,
    /// Trailing window size for marker detection.
    pub marker_window_chars: usize,
    /// Leaked role / stage-direction prefixes, suppressed before the
    /// final answer opens.
    pub role_prefixes: Vec<CompiledPattern>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            snapshot_slack_chars: DEFAULT_SNAPSHOT_SLACK_CHARS,
            final_marker: Some(DEFAULT_FINAL_MARKER.to_string()),
            marker_window_chars: DEFAULT_MARKER_WINDOW_CHARS,
            role_prefixes: default_role_prefix_patterns(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trailing window
// ---------------------------------------------------------------------------

/// Fixed-size window over the most recent text, for finding a marker
/// that may straddle fragment boundaries.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    tail: String,
    capacity: usize,
}

impl TrailingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            tail: String::new(),
            capacity,
        }
    }

    /// Append `text` and report whether `needle` occurs in the retained
    /// tail plus `text`. Afterwards only the last `capacity` chars remain.
    pub fn observe(&mut self, text: &str, needle: &str) -> bool {
        self.tail.push_str(text);
        let found = !needle.is_empty() && self.tail.contains(needle);

        let count = self.tail.chars().count();
        if count > self.capacity {
            let cut = self
                .tail
                .char_indices()
                .nth(count - self.capacity)
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.tail.drain(..cut);
        }
        found
    }

    pub fn contents(&self) -> &str {
        &self.tail
    }
}

// ---------------------------------------------------------------------------
// Per-stream state
// ---------------------------------------------------------------------------

/// Mutable state for one stream. Owned by the task handling that stream.
#[derive(Debug, Clone)]
pub struct NormalizerState {
    emitted: String,
    saw_delta: bool,
    final_opened: bool,
    window: TrailingWindow,
}

impl NormalizerState {
    pub fn new(config: &GateConfig) -> Self {
        let marker_len = config
            .final_marker
            .as_deref()
            .map(|m| m.chars().count())
            .unwrap_or(0);
        Self {
            emitted: String::new(),
            saw_delta: false,
            final_opened: config.final_marker.is_none(),
            window: TrailingWindow::new(config.marker_window_chars.max(marker_len)),
        }
    }

    /// Visible text accumulated so far.
    pub fn emitted(&self) -> &str {
        &self.emitted
    }

    /// Whether an incremental delta has been emitted.
    pub fn saw_delta(&self) -> bool {
        self.saw_delta
    }

    /// Whether the final-answer marker has been seen.
    pub fn final_opened(&self) -> bool {
        self.final_opened
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Gate {
    config: GateConfig,
}

impl Gate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Fresh state for a new stream.
    pub fn new_state(&self) -> NormalizerState {
        NormalizerState::new(&self.config)
    }

    /// Gate one fragment, updating `state`.
    pub fn accept(&self, fragment: &ExtractedFragment, state: &mut NormalizerState) -> GateDecision {
        if fragment.kind == FragmentKind::Reasoning {
            return GateDecision::Suppress(SuppressReason::Reasoning);
        }

        if fragment.kind == FragmentKind::TerminalSnapshot && state.saw_delta {
            return self.accept_snapshot(&fragment.text, state);
        }

        let text = fragment.text.as_str();
        if text.is_empty() {
            return GateDecision::Suppress(SuppressReason::Empty);
        }

        self.observe_marker(text, state);
        if let Some(reason) = self.pre_final_reason(text, state) {
            return GateDecision::Suppress(reason);
        }

        state.emitted.push_str(text);
        if fragment.kind == FragmentKind::IncrementalDelta {
            state.saw_delta = true;
        }
        GateDecision::Emit(text.to_string())
    }

    /// A snapshot after streamed deltas. Only text past what the client
    /// already has is forwarded; alignment ignores whitespace and skips
    /// leading text the gate held back earlier.
    fn accept_snapshot(&self, snapshot: &str, state: &mut NormalizerState) -> GateDecision {
        if visible_len(snapshot) <= visible_len(&state.emitted) + self.config.snapshot_slack_chars {
            return GateDecision::Suppress(SuppressReason::RedundantSnapshot);
        }

        let end = match align_visible(&state.emitted, snapshot) {
            Some(end) => end,
            None => return GateDecision::Suppress(SuppressReason::DivergentSnapshot),
        };
        let mut tail = &snapshot[end..];
        if state.emitted.ends_with(char::is_whitespace) {
            tail = tail.trim_start();
        }
        if visible_len(tail) == 0 {
            return GateDecision::Suppress(SuppressReason::RedundantSnapshot);
        }

        self.observe_marker(tail, state);
        if let Some(reason) = self.pre_final_reason(tail, state) {
            return GateDecision::Suppress(reason);
        }

        state.emitted.push_str(tail);
        GateDecision::Replace {
            snapshot: snapshot.to_string(),
            tail: tail.to_string(),
        }
    }

    /// Why `text` must be held back while the final answer is not open.
    fn pre_final_reason(&self, text: &str, state: &NormalizerState) -> Option<SuppressReason> {
        if state.final_opened {
            return None;
        }
        if is_placeholder(text) {
            return Some(SuppressReason::Placeholder);
        }
        if self.config.role_prefixes.iter().any(|p| p.is_match(text)) {
            return Some(SuppressReason::RolePrefix);
        }
        None
    }

    fn observe_marker(&self, text: &str, state: &mut NormalizerState) {
        if state.final_opened {
            return;
        }
        if let Some(marker) = self.config.final_marker.as_deref() {
            if state.window.observe(text, marker) {
                state.final_opened = true;
            }
        }
    }
}

/// Ellipsis-only filler: `...`, `…`, `. . .` and the like.
fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut dots = 0;
    for c in trimmed.chars() {
        match c {
            '.' => dots += 1,
            '\u{2026}' => dots += 3,
            c if c.is_whitespace() => {}
            _ => return false,
        }
    }
    dots >= 3
}

fn visible_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Byte offset in `snapshot` just past the text already emitted, matching
/// non-whitespace characters only. The emitted text is looked for as a
/// prefix first, then anywhere, since a snapshot also repeats fragments
/// that were suppressed before the answer opened. `None` if it is absent.
fn align_visible(emitted: &str, snapshot: &str) -> Option<usize> {
    let needle: Vec<char> = emitted.chars().filter(|c| !c.is_whitespace()).collect();
    if needle.is_empty() {
        return Some(0);
    }
    let hay: Vec<(usize, char)> = snapshot
        .char_indices()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();
    if hay.len() < needle.len() {
        return None;
    }

    (0..=hay.len() - needle.len())
        .find(|&start| {
            hay[start..start + needle.len()]
                .iter()
                .map(|(_, c)| *c)
                .eq(needle.iter().copied())
        })
        .map(|start| {
            let (i, c) = hay[start + needle.len() - 1];
            i + c.len_utf8()
        })
}
