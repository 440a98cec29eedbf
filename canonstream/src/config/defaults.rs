// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

use super::pattern::CompiledPattern;

/// Leaked role labels and stage directions seen at the start of fragments
/// from models told to think before answering. Case-insensitive, anchored.
pub const DEFAULT_ROLE_PREFIX_PATTERNS: &[&str] = &[
    r"(?i)^\s*(assistant|user|system|human|ai|model)\s*:",
    r"(?i)^\s*(thought|thoughts|thinking|analysis|reasoning|reflection|plan|draft)\s*:",
    r"(?i)^\s*\[(assistant|user|system|thinking|internal|draft)\]",
    r"(?i)^\s*\((thinking|pauses|internal)[^)]*\)",
];

/// Compile the built-in role prefix patterns.
/// Panics on invalid regex (these are our own patterns).
pub fn default_role_prefix_patterns() -> Vec<CompiledPattern> {
    CompiledPattern::compile_all(DEFAULT_ROLE_PREFIX_PATTERNS)
        .unwrap_or_else(|e| panic!("default role prefix pattern failed to compile: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(text: &str) -> bool {
        default_role_prefix_patterns().iter().any(|p| p.is_match(text))
    }

    #[test]
    fn defaults_compile() {
        assert_eq!(
            default_role_prefix_patterns().len(),
            DEFAULT_ROLE_PREFIX_PATTERNS.len()
        );
    }

    #[test]
    fn role_labels_match_case_insensitively() {
        assert!(matches("Assistant: sure"));
        assert!(matches("  USER : hi"));
        assert!(matches("Thinking: the user wants"));
        assert!(matches("[internal] note"));
        assert!(matches("(pauses to consider)"));
    }

    #[test]
    fn ordinary_text_does_not_match() {
        assert!(!matches("Hello there"));
        assert!(!matches("The assistant: a novel"));
        assert!(!matches("Plans are useful"));
        assert!(!matches("answer"));
    }
}
