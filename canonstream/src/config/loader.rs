// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

use axum::http::{HeaderName, HeaderValue};
use sha2::{Digest, Sha256};

use crate::stream::{
    GateConfig, PayloadStrictness, StreamMode, DEFAULT_FINAL_MARKER, DEFAULT_MARKER_WINDOW_CHARS,
    DEFAULT_REASONING_PREFIXES, DEFAULT_SNAPSHOT_SLACK_CHARS,
};

use super::defaults::default_role_prefix_patterns;
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::pattern::CompiledPattern;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version, URL, and enum-valued fields
/// 5. Resolve `${VAR}` interpolation in the upstream URL and headers, and
///    check header names and values are sendable
/// 6. Compile role prefix patterns (defaults first, then user patterns)
/// 7. Build typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.canonstream != "v1" {
        return Err(ConfigError::UnsupportedVersion(raw.canonstream));
    }

    let default_mode = match raw.default_mode.as_deref() {
        None => StreamMode::default(),
        Some(value) => StreamMode::parse(value).ok_or_else(|| ConfigError::InvalidValue {
            field: "default_mode",
            value: value.to_string(),
            expected: "normalize | passthrough",
        })?,
    };

    let upstream = build_upstream(raw.upstream)?;
    let normalizer = build_normalizer(raw.normalizer.unwrap_or_default())?;

    Ok(Config {
        version: raw.canonstream,
        default_mode,
        upstream,
        normalizer,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_upstream(raw: raw::RawUpstreamConfig) -> Result<UpstreamConfig, ConfigError> {
    let url = resolve_variables(&raw.url)?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            field: "upstream.url",
            value: url,
            expected: "an http:// or https:// URL",
        });
    }

    if raw.timeout_ms == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: "upstream.timeout_ms",
            value: "0".to_string(),
            expected: "a positive number of milliseconds",
        });
    }

    let mut headers = Vec::with_capacity(raw.headers.len());
    for (name, value) in raw.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "upstream.headers",
                value: name,
                expected: "a valid HTTP header name",
            });
        }
        let value = resolve_variables(&value)?;
        if HeaderValue::from_str(&value).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "upstream.headers",
                value: name,
                expected: "a header value of visible ASCII characters",
            });
        }
        headers.push((name.to_ascii_lowercase(), value));
    }

    Ok(UpstreamConfig {
        url,
        timeout_ms: raw.timeout_ms,
        headers,
    })
}

fn build_normalizer(raw: raw::RawNormalizerConfig) -> Result<NormalizerConfig, ConfigError> {
    let strictness = match raw.strictness.as_deref() {
        None | Some("discard") => PayloadStrictness::Discard,
        Some("literal") => PayloadStrictness::Literal,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: "normalizer.strictness",
                value: other.to_string(),
                expected: "discard | literal",
            })
        }
    };

    let final_marker = match raw.final_marker {
        None => Some(DEFAULT_FINAL_MARKER.to_string()),
        Some(marker) if marker.is_empty() => None,
        Some(marker) => Some(marker),
    };

    let marker_window_chars = raw
        .marker_window_chars
        .unwrap_or(DEFAULT_MARKER_WINDOW_CHARS);
    if marker_window_chars == 0 {
        return Err(ConfigError::InvalidValue {
            field: "normalizer.marker_window_chars",
            value: "0".to_string(),
            expected: "a positive number of characters",
        });
    }

    let mut role_prefixes = if raw.use_default_role_prefixes != Some(false) {
        default_role_prefix_patterns()
    } else {
        Vec::new()
    };
    role_prefixes.extend(CompiledPattern::compile_all(raw.role_prefixes.as_slice())?);

    let reasoning_prefixes = raw.reasoning_prefixes.unwrap_or_else(|| {
        DEFAULT_REASONING_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect()
    });
    if reasoning_prefixes.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidValue {
            field: "normalizer.reasoning_prefixes",
            value: String::new(),
            expected: "non-empty type prefixes",
        });
    }

    Ok(NormalizerConfig {
        strictness,
        gate: GateConfig {
            snapshot_slack_chars: raw
                .snapshot_slack_chars
                .unwrap_or(DEFAULT_SNAPSHOT_SLACK_CHARS),
            final_marker,
            marker_window_chars,
            role_prefixes,
        },
        reasoning_prefixes,
    })
}
