//! Text and tool-name policy checks.
//!
//! Both checks are pure: a rejection is reported as a [`Validation`] value so
//! callers can hand the reason to the user or to the model.

use regex::{Regex, RegexBuilder};

const SUSPICIOUS_CONTENT_PATTERNS: &[&str] = &[
    r"<script[\s\S]*?>[\s\S]*?</script>",
    r"javascript:",
    r"on\w+=",
    r"data:text/html",
    r"data:text/javascript",
    r"data:text/css",
];

const BLOCKED_TOOL_PATTERNS: &[&str] = &[
    r"exec",
    r"eval",
    r"shell",
    r"cmd",
    r"rm\s+",
    r"delete",
    r"drop",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Ok,
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct SecurityValidator {
    suspicious_content: Vec<Regex>,
    blocked_tools: Vec<Regex>,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityValidator {
    pub fn new() -> Self {
        Self {
            suspicious_content: compile_all(SUSPICIOUS_CONTENT_PATTERNS),
            blocked_tools: compile_all(BLOCKED_TOOL_PATTERNS),
        }
    }

    /// Reject markup or script injection in user text. Stops at the first
    /// matching pattern.
    pub fn validate_user_input(&self, text: &str) -> Validation {
        match self
            .suspicious_content
            .iter()
            .find(|pattern| pattern.is_match(text))
        {
            Some(pattern) => Validation::Rejected(format!(
                "input contains suspicious content matching pattern: {}",
                pattern.as_str()
            )),
            None => Validation::Ok,
        }
    }

    /// Reject tool names containing a blocklisted fragment. Unknown names are
    /// not this check's concern; routing rejects those separately.
    pub fn validate_tool_name(&self, name: &str) -> Validation {
        if self.blocked_tools.iter().any(|pattern| pattern.is_match(name)) {
            Validation::Rejected(format!("tool '{name}' matches blocked pattern"))
        } else {
            Validation::Ok
        }
    }
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
}
