//! Trigger matcher: decides whether a message starts a new conversation.
//!
//! The start pattern comes from configuration, so it is checked for catastrophic-backtracking
//! shapes before it is ever handed to the regex engine. Anything that fails the check (or fails
//! to compile) falls back to the default trigger: a case-insensitive match on "lex".

use regex::{Regex, RegexBuilder};

/// Literal matched (case-insensitively) when no usable pattern is configured.
pub const DEFAULT_TRIGGER: &str = "lex";

const MAX_PATTERN_LEN: usize = 256;
const MAX_REPETITION: u32 = 100;
const MAX_COMPILED_SIZE: usize = 1 << 20;

/// Why a configured start pattern was refused.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern length {len} exceeds max {max}")]
    TooLong { len: usize, max: usize },
    #[error("nested quantifier at byte {0}")]
    NestedQuantifier(usize),
    #[error("repetition bound {bound} exceeds max {max}")]
    RepetitionTooLarge { bound: u32, max: u32 },
    #[error("unbalanced parentheses")]
    Unbalanced,
    #[error("invalid pattern: {0}")]
    Invalid(#[from] regex::Error),
}

/// Compiled trigger; either the built-in default or a validated configured pattern.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    Default,
    Pattern(Regex),
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self {
            kind: Kind::Default,
        }
    }
}

impl TriggerMatcher {
    /// Validate and compile a pattern. Matching is case-insensitive.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        check_pattern_safety(pattern)?;
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(MAX_COMPILED_SIZE)
            .build()?;
        Ok(Self {
            kind: Kind::Pattern(regex),
        })
    }

    /// Build the matcher from the configured pattern, falling back to the default when the
    /// pattern is absent, unsafe or invalid.
    pub fn from_config(pattern: Option<&str>) -> Self {
        let Some(pattern) = pattern else {
            log::info!("trigger: no start pattern configured, using default \"{}\"", DEFAULT_TRIGGER);
            return Self::default();
        };
        match Self::new(pattern) {
            Ok(m) => {
                log::debug!("trigger: using start pattern {:?}", pattern);
                m
            }
            Err(e) => {
                log::info!(
                    "trigger: start pattern {:?} rejected ({}), using default \"{}\"",
                    pattern,
                    e,
                    DEFAULT_TRIGGER
                );
                Self::default()
            }
        }
    }

    /// True when the text is a conversation-start trigger.
    pub fn is_match(&self, text: &str) -> bool {
        match &self.kind {
            Kind::Default => text.to_lowercase().contains(DEFAULT_TRIGGER),
            Kind::Pattern(re) => re.is_match(text),
        }
    }

    /// True when the built-in default is in use.
    pub fn is_default(&self) -> bool {
        matches!(self.kind, Kind::Default)
    }

    /// Pattern source, for logs and `relay check`.
    pub fn as_str(&self) -> &str {
        match &self.kind {
            Kind::Default => DEFAULT_TRIGGER,
            Kind::Pattern(re) => re.as_str(),
        }
    }
}

#[derive(Default)]
struct GroupScan {
    /// Any quantifier (or quantified subgroup) inside this group.
    has_quantifier: bool,
}

/// Reject patterns with shapes known to backtrack catastrophically in backtracking engines:
/// an unbounded quantifier applied to a group that already contains a quantifier
/// (`(a+)+`, `(a*)*`, `(\d{2,})+`), and oversized counted repetitions.
pub fn check_pattern_safety(pattern: &str) -> Result<(), PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(PatternError::TooLong {
            len: pattern.len(),
            max: MAX_PATTERN_LEN,
        });
    }

    let bytes = pattern.as_bytes();
    let mut stack: Vec<GroupScan> = vec![GroupScan::default()];
    // Set right after `)` to what the closed group contained; consumed by a following quantifier.
    let mut closed_group: Option<bool> = None;
    // Whether the previous token can take a quantifier (so `?` after `(` or a quantifier is a modifier).
    let mut quantifiable = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\\' => {
                i += 2;
                closed_group = None;
                quantifiable = true;
                continue;
            }
            b'[' => {
                i = skip_class(bytes, i);
                closed_group = None;
                quantifiable = true;
                continue;
            }
            b'(' => {
                stack.push(GroupScan::default());
                closed_group = None;
                quantifiable = false;
                // Skip group flags / non-capturing / named-group syntax.
                if bytes.get(i + 1) == Some(&b'?') {
                    i += 2;
                    while i < bytes.len() && bytes[i] != b')' && bytes[i] != b':' && bytes[i] != b'>' {
                        i += 1;
                    }
                    if i < bytes.len() && bytes[i] == b')' {
                        // Inline flags group like `(?i)`; closes immediately.
                        stack.pop();
                        i += 1;
                        continue;
                    }
                }
                i += 1;
                continue;
            }
            b')' => {
                if stack.len() < 2 {
                    return Err(PatternError::Unbalanced);
                }
                let group = stack.pop().unwrap_or_default();
                closed_group = Some(group.has_quantifier);
                quantifiable = true;
                if group.has_quantifier {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_quantifier = true;
                    }
                }
                i += 1;
                continue;
            }
            b'*' | b'+' | b'?' | b'{' => {
                if !quantifiable {
                    // Lazy/possessive modifier or literal; nothing to check.
                    i += 1;
                    continue;
                }
                let (unbounded, next) = if b == b'{' {
                    match parse_repetition(bytes, i)? {
                        Some((unbounded, next)) => (unbounded, next),
                        None => {
                            // Literal `{`.
                            i += 1;
                            closed_group = None;
                            continue;
                        }
                    }
                } else {
                    (b != b'?', i + 1)
                };
                if unbounded && closed_group == Some(true) {
                    return Err(PatternError::NestedQuantifier(i));
                }
                if let Some(current) = stack.last_mut() {
                    current.has_quantifier = true;
                }
                closed_group = None;
                quantifiable = false;
                i = next;
                continue;
            }
            _ => {
                closed_group = None;
                quantifiable = true;
                i += 1;
            }
        }
    }

    if stack.len() != 1 {
        return Err(PatternError::Unbalanced);
    }
    Ok(())
}

/// Index just past the character class starting at `start` (`[`).
fn skip_class(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if bytes.get(i) == Some(&b'^') {
        i += 1;
    }
    if bytes.get(i) == Some(&b']') {
        i += 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b']' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Parse `{n}`, `{n,}` or `{n,m}` at `start`. Returns (allows more than one repetition, next index),
/// or None when the brace is not a repetition.
fn parse_repetition(bytes: &[u8], start: usize) -> Result<Option<(bool, usize)>, PatternError> {
    let Some(rel_end) = bytes[start..].iter().position(|&b| b == b'}') else {
        return Ok(None);
    };
    let end = start + rel_end;
    let inner = match std::str::from_utf8(&bytes[start + 1..end]) {
        Ok(s) => s,
        Err(_) => return Ok(None),
    };
    let (min, max) = match inner.split_once(',') {
        Some((min, max)) => (min.trim(), Some(max.trim())),
        None => (inner.trim(), None),
    };
    let Ok(min) = min.parse::<u32>() else {
        return Ok(None);
    };
    let bound = match max {
        None => Some(min),
        Some("") => None,
        Some(m) => match m.parse::<u32>() {
            Ok(m) => Some(m),
            Err(_) => return Ok(None),
        },
    };
    let largest = bound.unwrap_or(min).max(min);
    if largest > MAX_REPETITION {
        return Err(PatternError::RepetitionTooLarge {
            bound: largest,
            max: MAX_REPETITION,
        });
    }
    let unbounded = bound.map_or(true, |b| b > 1);
    Ok(Some((unbounded, end + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_lex_case_insensitively() {
        let m = TriggerMatcher::default();
        assert!(m.is_match("@relay lex hello"));
        assert!(m.is_match("LEX please"));
        assert!(m.is_match("flexible"));
        assert!(!m.is_match("@relay hello"));
    }

    #[test]
    fn configured_pattern_is_case_insensitive() {
        let m = TriggerMatcher::from_config(Some("^order\\s+pizza"));
        assert!(!m.is_default());
        assert!(m.is_match("Order  Pizza now"));
        assert!(!m.is_match("no order pizza"));
    }

    #[test]
    fn absent_pattern_uses_default() {
        let m = TriggerMatcher::from_config(None);
        assert!(m.is_default());
        assert_eq!(m.as_str(), "lex");
    }

    #[test]
    fn nested_quantifiers_fall_back() {
        for p in ["(a+)+", "(a*)*", "(x+x+)+y", "(\\d{2,})+", "((ab)*c)+", "(?:a+)*"] {
            assert!(
                matches!(check_pattern_safety(p), Err(PatternError::NestedQuantifier(_))),
                "{} should be rejected",
                p
            );
            assert!(TriggerMatcher::from_config(Some(p)).is_default());
        }
    }

    #[test]
    fn plain_quantifiers_are_allowed() {
        for p in ["lex", "a+b*", "(ab)+", "(a+)?", "^hey\\s+bot", "[a-z]+(foo)?", "(?i)lex", "a{2,5}", "(a+){1}"] {
            assert!(check_pattern_safety(p).is_ok(), "{} should be allowed", p);
        }
    }

    #[test]
    fn quantifier_inside_class_is_literal() {
        assert!(check_pattern_safety("([+*])+").is_ok());
        assert!(check_pattern_safety("(\\+)+").is_ok());
    }

    #[test]
    fn oversized_patterns_fall_back() {
        let long = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(matches!(check_pattern_safety(&long), Err(PatternError::TooLong { .. })));
        assert!(matches!(
            check_pattern_safety("a{1000}"),
            Err(PatternError::RepetitionTooLarge { .. })
        ));
        assert!(matches!(check_pattern_safety(""), Err(PatternError::Empty)));
    }

    #[test]
    fn invalid_pattern_falls_back() {
        assert!(matches!(check_pattern_safety("(lex"), Err(PatternError::Unbalanced)));
        assert!(matches!(TriggerMatcher::new("lex["), Err(PatternError::Invalid(_))));
        assert!(TriggerMatcher::from_config(Some("lex[")).is_default());
    }
}
