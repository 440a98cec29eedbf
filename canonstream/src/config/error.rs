// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

/// Everything that can go wrong loading `canonstream.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("unsupported config version \"{0}\", expected \"v1\"")]
    UnsupportedVersion(String),

    #[error("invalid value for {field}: \"{value}\" (expected {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid regex pattern \"{pattern}\": {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    #[error("undefined variable ${{{name}}} in config (not set in environment)")]
    UndefinedVariable { name: String },
}
