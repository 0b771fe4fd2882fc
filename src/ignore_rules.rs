//! Ignore handler: default skip set plus validated user-supplied globs.
//!
//! The tree walk itself is gitignore-aware (`ignore::WalkBuilder`); this layer
//! adds the indexer's own defaults (VCS metadata, build artifacts, caches,
//! binaries) and per-project / per-invocation patterns, matched against
//! project-relative paths.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::IndexError;

/// Patterns skipped on every project, independent of .gitignore.
const DEFAULT_PATTERNS: &[&str] = &[
    // VCS metadata
    ".git/**",
    ".hg/**",
    ".svn/**",
    // Build artifacts and dependency dirs
    "node_modules/**",
    "target/**",
    "build/**",
    "dist/**",
    "out/**",
    "venv/**",
    ".venv/**",
    "**/__pycache__/**",
    "*.egg-info/**",
    // Caches
    ".cache/**",
    ".pytest_cache/**",
    ".mypy_cache/**",
    ".tox/**",
    // Binaries and media
    "*.pyc",
    "*.pyo",
    "*.so",
    "*.dll",
    "*.dylib",
    "*.exe",
    "*.o",
    "*.a",
    "*.class",
    "*.jar",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.pdf",
    "*.min.js",
    "*.min.css",
    "*.lock",
];

/// Caps applied to user-supplied patterns before compilation.
const MAX_PATTERN_LEN: usize = 1_000;
const MAX_ASTERISKS: usize = 10;
const MAX_QUESTION_MARKS: usize = 20;

/// Compiled ignore rules for one index run.
#[derive(Debug)]
pub struct IgnoreRules {
    set: GlobSet,
    patterns: Vec<String>,
}

impl IgnoreRules {
    /// Build from the default set plus custom patterns. Custom patterns are
    /// validated before compilation; a bad one fails the whole construction.
    pub fn new(custom: &[String]) -> Result<Self, IndexError> {
        let mut patterns: Vec<String> = DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();
        for pat in custom {
            validate_pattern(pat)?;
            patterns.push(pat.clone());
        }

        let mut builder = GlobSetBuilder::new();
        for pat in &patterns {
            let glob = Glob::new(pat).map_err(|e| IndexError::InvalidPattern {
                pattern: pat.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| IndexError::InvalidPattern {
            pattern: String::new(),
            reason: e.to_string(),
        })?;

        Ok(IgnoreRules { set, patterns })
    }

    /// Should this project-relative path be skipped?
    pub fn should_skip(&self, relative: &Path) -> bool {
        if self.set.is_match(relative) {
            return true;
        }
        // Directory-component match: "node_modules/**" style patterns only
        // match below the dir, so check each ancestor too.
        relative.ancestors().skip(1).any(|a| !a.as_os_str().is_empty() && self.set.is_match(a))
    }

    /// All active patterns, defaults first.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Reject patterns that are null-byte injected, absurdly long, or wildcard
/// bombs (cheap DoS guard before glob compilation).
pub fn validate_pattern(pattern: &str) -> Result<(), IndexError> {
    if pattern.is_empty() {
        return Err(IndexError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "empty pattern".into(),
        });
    }
    if pattern.contains('\0') {
        return Err(IndexError::InvalidPattern {
            pattern: pattern.replace('\0', "\\0"),
            reason: "contains null byte".into(),
        });
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(IndexError::InvalidPattern {
            pattern: format!("{}...", &pattern[..32]),
            reason: format!("exceeds {} characters", MAX_PATTERN_LEN),
        });
    }
    let asterisks = pattern.chars().filter(|&c| c == '*').count();
    if asterisks > MAX_ASTERISKS {
        return Err(IndexError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("more than {} '*' wildcards", MAX_ASTERISKS),
        });
    }
    let question_marks = pattern.chars().filter(|&c| c == '?').count();
    if question_marks > MAX_QUESTION_MARKS {
        return Err(IndexError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("more than {} '?' wildcards", MAX_QUESTION_MARKS),
        });
    }
    Ok(())
}
