//! Turning raw chat text into an assistant query.

use regex::{Regex, RegexBuilder};

/// Command prefix that addresses the assistant explicitly.
pub const COMMAND_PREFIX: &str = "/llm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind<'a> {
    ShowTools,
    ShowHelp,
    ShowStatus,
    Query(&'a str),
}

/// Recognises the introspection subcommands. Matching is exact after
/// trimming and ignores case; anything else is a query.
pub fn classify_query(text: &str) -> QueryKind<'_> {
    let trimmed = text.trim();
    match trimmed.to_lowercase().as_str() {
        "tools" | "tool" => QueryKind::ShowTools,
        "help" => QueryKind::ShowHelp,
        "status" => QueryKind::ShowStatus,
        _ => QueryKind::Query(trimmed),
    }
}

/// The trimmed query after a leading `/llm` command, or `None` when the
/// text is not one. The prefix must stand alone: `/llmfoo` is not a command.
pub fn command_query(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(COMMAND_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim().to_string())
}

/// Matches a friendly trigger name such as "dino" or "hey dino".
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    pattern: Regex,
}

impl TriggerMatcher {
    /// Returns `None` for blank names.
    pub fn new(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let pattern = RegexBuilder::new(&format!(
            r"\b(?:hey\s+)?{}\b[\s,:!?]*",
            regex::escape(name)
        ))
        .case_insensitive(true)
        .build()
        .ok()?;
        Some(Self { pattern })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// The text with the first trigger occurrence removed, trimmed. `None`
    /// when the trigger does not occur.
    pub fn strip(&self, text: &str) -> Option<String> {
        if !self.matches(text) {
            return None;
        }
        Some(self.pattern.replacen(text, 1, "").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_are_case_insensitive_and_exact() {
        assert_eq!(classify_query("tools"), QueryKind::ShowTools);
        assert_eq!(classify_query("  TOOL "), QueryKind::ShowTools);
        assert_eq!(classify_query("Help"), QueryKind::ShowHelp);
        assert_eq!(classify_query("STATUS"), QueryKind::ShowStatus);
        assert_eq!(
            classify_query("tools please"),
            QueryKind::Query("tools please")
        );
        assert_eq!(
            classify_query("  what's up "),
            QueryKind::Query("what's up")
        );
    }

    #[test]
    fn command_prefix_is_removed_once() {
        assert_eq!(command_query("/llm what is rust").as_deref(), Some("what is rust"));
        assert_eq!(command_query("  /llm  ").as_deref(), Some(""));
        assert_eq!(command_query("/llm say /llm").as_deref(), Some("say /llm"));
        assert_eq!(command_query("/llm\tnext").as_deref(), Some("next"));
    }

    #[test]
    fn command_prefix_needs_a_word_boundary() {
        assert_eq!(command_query("/llmfoo bar"), None);
        assert_eq!(command_query("/llm_help"), None);
        assert_eq!(command_query("hello /llm"), None);
    }

    #[test]
    fn trigger_strips_name_and_punctuation() {
        let trigger = TriggerMatcher::new("dino").expect("trigger");
        assert_eq!(
            trigger.strip("hey Dino, what time is it?").as_deref(),
            Some("what time is it?")
        );
        assert_eq!(trigger.strip("DINO: weather").as_deref(), Some("weather"));
        assert_eq!(trigger.strip("dino!").as_deref(), Some(""));
        assert_eq!(trigger.strip("dinosaurs are cool"), None);
    }

    #[test]
    fn trigger_name_is_escaped() {
        let trigger = TriggerMatcher::new("r2.d2").expect("trigger");
        assert!(trigger.matches("r2.d2 hi"));
        assert!(!trigger.matches("r2xd2 hi"));
        assert!(TriggerMatcher::new("  ").is_none());
    }
}
