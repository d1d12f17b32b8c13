// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource-type pattern matching.
//!
//! Patterns are compiled once when routing is configured. Globs without
//! metacharacters compare exactly; other globs are translated to anchored
//! regular expressions (`*` matches any run of characters including `:`,
//! `?` matches one character, `[...]` is a character class). Regex patterns
//! are used as written and match anywhere unless the author anchors them.

use costplane_config::ConfigError;
use costplane_config::model::PatternType;
use regex::Regex;
use tracing::warn;

use crate::rules::RoutingRule;

/// A pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} pattern `{pattern}` for plugin `{plugin}`: {detail}")]
pub struct PatternError {
    pub plugin: String,
    pub kind: PatternType,
    pub pattern: String,
    pub detail: String,
}

impl From<PatternError> for ConfigError {
    fn from(e: PatternError) -> Self {
        ConfigError::InvalidPattern {
            plugin: e.plugin,
            kind: e.kind.to_string(),
            pattern: e.pattern,
            detail: e.detail,
        }
    }
}

/// Every pattern that failed during a strict compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} invalid routing pattern(s){}", .0.len(), indented(.0))]
pub struct PatternErrors(pub Vec<PatternError>);

fn indented(errors: &[PatternError]) -> String {
    errors.iter().map(|e| format!("\n  {e}")).collect()
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, resource_type: &str) -> bool {
        match self {
            Matcher::Literal(s) => s == resource_type,
            Matcher::Regex(re) => re.is_match(resource_type),
        }
    }
}

/// A pattern rule with its compiled matcher.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: RoutingRule,
    matcher: Matcher,
}

/// Compiled pattern rules, kept in configuration order.
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    rules: Vec<CompiledRule>,
}

impl MatcherSet {
    /// Compile every pattern rule, skipping (and returning) the invalid ones.
    ///
    /// Rules without a pattern are ignored.
    pub fn compile(rules: &[RoutingRule]) -> (Self, Vec<PatternError>) {
        let mut set = MatcherSet::default();
        let mut errors = Vec::new();
        for rule in rules {
            let Some(pattern) = &rule.pattern else {
                continue;
            };
            let compiled = match pattern.kind {
                PatternType::Glob => compile_glob(&pattern.pattern),
                PatternType::Regex => Regex::new(&pattern.pattern)
                    .map(Matcher::Regex)
                    .map_err(|e| e.to_string()),
            };
            match compiled {
                Ok(matcher) => set.rules.push(CompiledRule {
                    rule: rule.clone(),
                    matcher,
                }),
                Err(detail) => {
                    warn!(
                        plugin = %rule.plugin,
                        kind = %pattern.kind,
                        pattern = %pattern.pattern,
                        %detail,
                        "skipping invalid routing pattern"
                    );
                    errors.push(PatternError {
                        plugin: rule.plugin.clone(),
                        kind: pattern.kind,
                        pattern: pattern.pattern.clone(),
                        detail,
                    });
                }
            }
        }
        (set, errors)
    }

    /// Compile every pattern rule, failing if any pattern is invalid.
    pub fn compile_strict(rules: &[RoutingRule]) -> Result<Self, PatternErrors> {
        let (set, errors) = Self::compile(rules);
        if errors.is_empty() {
            Ok(set)
        } else {
            Err(PatternErrors(errors))
        }
    }

    /// Rules whose pattern matches `resource_type`, in configuration order.
    pub fn matches(&self, resource_type: &str) -> Vec<&CompiledRule> {
        self.rules
            .iter()
            .filter(|r| r.matcher.is_match(resource_type))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_glob(glob: &str) -> Result<Matcher, String> {
    if !glob.contains(['*', '?', '[']) {
        return Ok(Matcher::Literal(glob.to_string()));
    }

    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    re.push('^');
                }
                let mut closed = false;
                let mut empty = true;
                for c in chars.by_ref() {
                    if c == ']' && !empty {
                        closed = true;
                        break;
                    }
                    empty = false;
                    if matches!(c, '\\' | '[' | ']') {
                        re.push('\\');
                    }
                    re.push(c);
                }
                if !closed {
                    return Err(format!("unterminated character class in `{glob}`"));
                }
                re.push(']');
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');

    Regex::new(&re).map(Matcher::Regex).map_err(|e| e.to_string())
}
