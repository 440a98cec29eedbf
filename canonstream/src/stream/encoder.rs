// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Canonical encoder
//
// One output event shape, regardless of which upstream produced the text:
//
//     data: {"response":"<text>"}\n\n
//
// This envelope is the only outward-facing contract and must stay
// byte-stable across upstream protocol changes.

use bytes::Bytes;
use serde::Serialize;

use super::types::GateDecision;

/// The single text field of the canonical envelope.
pub const CANONICAL_FIELD: &str = "response";

#[derive(Serialize)]
struct CanonicalEnvelope<'a> {
    response: &'a str,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a str,
}

/// Serializes accepted text into canonical SSE events.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalEncoder;

impl CanonicalEncoder {
    /// Encode one visible fragment as a canonical event.
    pub fn encode(&self, text: &str) -> Bytes {
        frame(&CanonicalEnvelope { response: text })
    }

    /// Encode a gate decision. Suppressions and empty tails produce nothing.
    pub fn encode_decision(&self, decision: &GateDecision) -> Option<Bytes> {
        match decision {
            GateDecision::Emit(text) if !text.is_empty() => Some(self.encode(text)),
            GateDecision::Replace { tail, .. } if !tail.is_empty() => Some(self.encode(tail)),
            _ => None,
        }
    }

    /// The single structured failure payload, sent before closing a
    /// stream that broke mid-flight.
    pub fn encode_error(&self, message: &str) -> Bytes {
        frame(&ErrorEnvelope { error: message })
    }
}

fn frame<T: Serialize>(envelope: &T) -> Bytes {
    // A struct of &str fields cannot fail to serialize.
    let json = serde_json::to_string(envelope).unwrap_or_default();
    Bytes::from(format!("data: {json}\n\n"))
}
