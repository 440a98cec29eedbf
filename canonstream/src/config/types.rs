// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::stream::{Gate, GateConfig, Normalizer, PayloadStrictness, StreamMode, TextExtractor};

/// Parsed and validated `canonstream.yaml`.
#[derive(Debug)]
pub struct Config {
    /// Config version. Always "v1".
    pub version: String,
    /// Mode used when a request carries no mode flag.
    pub default_mode: StreamMode,
    pub upstream: UpstreamConfig,
    pub normalizer: NormalizerConfig,
    /// SHA256 of the raw YAML: "sha256:{hex}". Logged at startup so a
    /// deployment's effective config can be identified.
    pub config_hash: String,
}

/// Where streaming requests are forwarded.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Full URL, variables resolved.
    pub url: String,
    pub timeout_ms: Option<u64>,
    /// Extra request headers (e.g. authorization), variables resolved.
    pub headers: Vec<(String, String)>,
}

/// Settings for the normalization pipeline.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub strictness: PayloadStrictness,
    pub gate: GateConfig,
    pub reasoning_prefixes: Vec<String>,
}

impl NormalizerConfig {
    /// Build the shared normalizer these settings describe.
    pub fn build(&self) -> Normalizer {
        Normalizer::new(
            Arc::new(TextExtractor::with_reasoning_prefixes(
                self.reasoning_prefixes.clone(),
            )),
            Gate::new(self.gate.clone()),
            self.strictness,
        )
    }
}
