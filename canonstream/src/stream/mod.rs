// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Streaming response normalizer
//
// Responsibilities:
// - Reassemble SSE events from arbitrarily split upstream byte chunks
// - Extract visible text from any known upstream payload shape
// - Suppress reasoning, pre-answer noise, and duplicate completion snapshots
// - Re-encode accepted text as one canonical event shape
// - Pass upstream bytes through untouched when normalization is opted out

mod encoder;
mod extractor;
mod gate;
mod processor;
mod reassembler;
mod types;

pub use encoder::{CanonicalEncoder, CANONICAL_FIELD};
pub use extractor::{
    unwrap_text, ChatCompletionProbe, CompletedSnapshotProbe, FlatTextProbe, LegacyFieldProbe,
    ReasoningProbe, TaggedDeltaProbe, TextExtractor, TextProbe, DEFAULT_REASONING_PREFIXES,
};
pub use gate::{
    Gate, GateConfig, NormalizerState, TrailingWindow, DEFAULT_FINAL_MARKER,
    DEFAULT_MARKER_WINDOW_CHARS, DEFAULT_SNAPSHOT_SLACK_CHARS,
};
pub use processor::{Normalizer, NormalizerSession, SessionStats, StreamProcessor};
pub use reassembler::FrameReassembler;
pub use types::{
    ExtractedFragment, FragmentKind, GateDecision, LogicalEvent, PayloadStrictness, StreamError,
    StreamMode, SuppressReason, UpstreamError, DONE_SENTINEL,
};
