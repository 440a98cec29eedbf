// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config because public types hold compiled
// regexes and parsed enums, and interpolation runs in between.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub canonstream: String,
    pub default_mode: Option<String>,
    pub upstream: RawUpstreamConfig,
    pub normalizer: Option<RawNormalizerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpstreamConfig {
    pub url: String,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawNormalizerConfig {
    pub strictness: Option<String>,
    pub snapshot_slack_chars: Option<usize>,
    /// Empty string disables marker gating.
    pub final_marker: Option<String>,
    pub marker_window_chars: Option<usize>,
    #[serde(default)]
    pub role_prefixes: Vec<String>,
    /// If false, only `role_prefixes` are used. Default: true.
    pub use_default_role_prefixes: Option<bool>,
    pub reasoning_prefixes: Option<Vec<String>>,
}
