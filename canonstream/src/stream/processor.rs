// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// bytes -> reassembler -> decode -> extractor -> gate -> encoder -> bytes
//
// `NormalizerSession` is the synchronous per-stream pipeline.
// `StreamProcessor` drives a session from an async upstream byte stream
// on its own task and hands back the output as a stream. Dropping the
// output stream stops upstream consumption.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::Instrument;

use super::encoder::CanonicalEncoder;
use super::extractor::TextExtractor;
use super::gate::{Gate, NormalizerState};
use super::reassembler::FrameReassembler;
use super::types::{
    ExtractedFragment, GateDecision, LogicalEvent, PayloadStrictness, StreamError, StreamMode,
    UpstreamError,
};

/// Output channel depth. Bounds how far the pipeline runs ahead of a slow
/// consumer.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Normalizer (shared, immutable)
// ---------------------------------------------------------------------------

/// Shared normalization setup. Cheap to clone; holds no per-stream state.
#[derive(Debug, Clone)]
pub struct Normalizer {
    extractor: Arc<TextExtractor>,
    gate: Arc<Gate>,
    strictness: PayloadStrictness,
}

impl Normalizer {
    pub fn new(extractor: Arc<TextExtractor>, gate: Gate, strictness: PayloadStrictness) -> Self {
        Self {
            extractor,
            gate: Arc::new(gate),
            strictness,
        }
    }

    /// Start a new stream.
    pub fn session(&self) -> NormalizerSession {
        NormalizerSession {
            extractor: self.extractor.clone(),
            gate: self.gate.clone(),
            strictness: self.strictness,
            encoder: CanonicalEncoder,
            reassembler: FrameReassembler::new(),
            state: self.gate.new_state(),
            stats: SessionStats::default(),
            done: false,
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            Arc::new(TextExtractor::standard()),
            Gate::default(),
            PayloadStrictness::default(),
        )
    }
}

// ---------------------------------------------------------------------------
// Per-stream session
// ---------------------------------------------------------------------------

/// Counters for one stream, logged when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Complete upstream events seen.
    pub events: usize,
    /// Canonical events written.
    pub emitted: usize,
    /// Fragments held back by the gate.
    pub suppressed: usize,
    /// Events dropped as undecodable.
    pub discarded: usize,
}

/// One stream's reassembler, gate state and counters.
pub struct NormalizerSession {
    extractor: Arc<TextExtractor>,
    gate: Arc<Gate>,
    strictness: PayloadStrictness,
    encoder: CanonicalEncoder,
    reassembler: FrameReassembler,
    state: NormalizerState,
    stats: SessionStats,
    done: bool,
}

impl NormalizerSession {
    /// Feed one upstream chunk; returns the canonical events it produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        if self.done {
            return Vec::new();
        }
        let events = self.reassembler.feed(chunk);
        self.handle_events(events)
    }

    /// End of upstream: process any unterminated final event.
    pub fn finish(&mut self) -> Vec<Bytes> {
        if self.done {
            return Vec::new();
        }
        let events: Vec<LogicalEvent> = self.reassembler.flush().into_iter().collect();
        let out = self.handle_events(events);
        self.done = true;
        out
    }

    /// True once the end-of-stream sentinel was seen or `finish` ran.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn state(&self) -> &NormalizerState {
        &self.state
    }

    fn handle_events(&mut self, events: Vec<LogicalEvent>) -> Vec<Bytes> {
        let mut out = Vec::new();
        for event in events {
            if self.done {
                break;
            }
            self.stats.events += 1;

            if event.is_done() {
                self.done = true;
                break;
            }

            let fragment = match self.decode(&event) {
                Some(f) => f,
                None => continue,
            };

            let decision = self.gate.accept(&fragment, &mut self.state);
            if let GateDecision::Suppress(reason) = &decision {
                self.stats.suppressed += 1;
                tracing::debug!(reason = reason.as_str(), "fragment suppressed");
            }
            if let Some(bytes) = self.encoder.encode_decision(&decision) {
                self.stats.emitted += 1;
                out.push(bytes);
            }
        }
        out
    }

    /// Decode an event's payload and extract its fragment.
    ///
    /// Never fails: undecodable payloads are dropped (or passed as literal
    /// text), unknown shapes extract to nothing.
    fn decode(&mut self, event: &LogicalEvent) -> Option<ExtractedFragment> {
        if event.data.is_empty() {
            return None;
        }

        let concatenated = event.payload();
        let parsed = serde_json::from_str::<Value>(concatenated.trim())
            .ok()
            .or_else(|| {
                if event.data.len() > 1 {
                    serde_json::from_str::<Value>(event.payload_joined().trim()).ok()
                } else {
                    None
                }
            });

        match parsed {
            Some(value) => self.extractor.extract(&value),
            None => match self.strictness {
                PayloadStrictness::Discard => {
                    self.stats.discarded += 1;
                    tracing::debug!(
                        event = event.event.as_deref().unwrap_or(""),
                        bytes = concatenated.len(),
                        "discarding non-JSON payload"
                    );
                    None
                }
                PayloadStrictness::Literal => {
                    Some(ExtractedFragment::delta(event.payload_joined()))
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Async driver
// ---------------------------------------------------------------------------

/// Runs the pipeline over an async upstream byte stream.
#[derive(Debug, Clone, Default)]
pub struct StreamProcessor {
    normalizer: Normalizer,
}

impl StreamProcessor {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Process an upstream byte stream, producing the output byte stream.
    ///
    /// In `Normalize` mode the output is the canonical stream. In
    /// `Passthrough` mode upstream bytes are forwarded unchanged. Either
    /// way, a mid-stream upstream failure ends the output with one error
    /// payload, and dropping the output stops reading the upstream.
    pub fn process<S>(&self, input: S, mode: StreamMode) -> ReceiverStream<Bytes>
    where
        S: Stream<Item = Result<Bytes, UpstreamError>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Bytes>(OUTPUT_CHANNEL_CAPACITY);
        let session = self.normalizer.session();

        let task = async move {
            match mode {
                StreamMode::Normalize => run_normalize(input, session, tx).await,
                StreamMode::Passthrough => run_passthrough(input, tx).await,
            }
        };
        tokio::spawn(task.instrument(tracing::Span::current()));

        ReceiverStream::new(rx)
    }
}

/// Outcome of waiting for the next upstream chunk.
enum Next {
    Chunk(Result<Bytes, UpstreamError>),
    End,
    ClientGone,
}

/// Wait for the next chunk, or for the consumer to go away.
async fn next_chunk<S>(input: &mut S, tx: &mpsc::Sender<Bytes>) -> Next
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Unpin,
{
    tokio::select! {
        biased;
        _ = tx.closed() => Next::ClientGone,
        item = input.next() => match item {
            Some(chunk) => Next::Chunk(chunk),
            None => Next::End,
        },
    }
}

async fn run_normalize<S>(mut input: S, mut session: NormalizerSession, tx: mpsc::Sender<Bytes>)
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Unpin,
{
    let encoder = CanonicalEncoder;

    loop {
        match next_chunk(&mut input, &tx).await {
            Next::Chunk(Ok(chunk)) => {
                let out = session.push(&chunk);
                if send_all(&tx, out).await.is_err() {
                    tracing::info!(stats = ?session.stats(), "client disconnected, upstream dropped");
                    return;
                }
                if session.is_done() {
                    break;
                }
            }
            Next::Chunk(Err(e)) => {
                let err = StreamError::Upstream(e);
                tracing::warn!(error = %err, stats = ?session.stats(), "upstream stream failed");
                let _ = tx.send(encoder.encode_error(err.public_message())).await;
                return;
            }
            Next::End => break,
            Next::ClientGone => {
                tracing::info!(stats = ?session.stats(), "client disconnected, upstream dropped");
                return;
            }
        }
    }

    let out = session.finish();
    let _ = send_all(&tx, out).await;

    let stats = session.stats();
    tracing::info!(
        events = stats.events,
        emitted = stats.emitted,
        suppressed = stats.suppressed,
        discarded = stats.discarded,
        final_opened = session.state().final_opened(),
        "stream normalized"
    );
}

async fn run_passthrough<S>(mut input: S, tx: mpsc::Sender<Bytes>)
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Unpin,
{
    loop {
        match next_chunk(&mut input, &tx).await {
            Next::Chunk(Ok(chunk)) => {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            Next::Chunk(Err(e)) => {
                let err = StreamError::Upstream(e);
                tracing::warn!(error = %err, "upstream stream failed (passthrough)");
                let _ = tx
                    .send(CanonicalEncoder.encode_error(err.public_message()))
                    .await;
                return;
            }
            Next::End | Next::ClientGone => return,
        }
    }
}

async fn send_all(tx: &mpsc::Sender<Bytes>, chunks: Vec<Bytes>) -> Result<(), ()> {
    for chunk in chunks {
        tx.send(chunk).await.map_err(|_| ())?;
    }
    Ok(())
}
