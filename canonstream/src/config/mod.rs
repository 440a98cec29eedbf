// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads canonstream.yaml, validates structure, resolves variable
// interpolation, compiles role prefix patterns, and computes a
// deterministic config hash.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod pattern;
mod raw;
mod source;
mod types;

pub use defaults::{default_role_prefix_patterns, DEFAULT_ROLE_PREFIX_PATTERNS};
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use pattern::CompiledPattern;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, NormalizerConfig, UpstreamConfig};
