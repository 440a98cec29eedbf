// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use regex::Regex;

use super::error::ConfigError;

/// A compiled regex that remembers its source, for logs and equality.
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Regex,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Compile a list, stopping at the first bad pattern.
    pub fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Self>, ConfigError> {
        patterns.iter().map(|p| Self::compile(p.as_ref())).collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledPattern({:?})", self.pattern)
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_all_reports_the_bad_pattern() {
        let err = CompiledPattern::compile_all(&["ok", "(unclosed"]).unwrap_err();
        match err {
            ConfigError::InvalidRegex { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn equality_by_source() {
        let a = CompiledPattern::compile("^x").unwrap();
        let b = CompiledPattern::compile("^x").unwrap();
        assert_eq!(a, b);
        assert!(a.is_match("xyz"));
        assert!(!a.is_match("yx"));
    }
}
