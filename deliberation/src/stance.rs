//! Stance directive extraction.
//!
//! Participants open every turn with a stance directive such as
//! `[STANCE: 4]`, optionally followed by a short parenthetical emotion cue
//! like `(firmly)`. This module turns the raw turn text into display text,
//! spoken text and a discrete 1–6 stance.
//!
//! Directive forms are an ordered list of [`DirectiveRule`]s. Each rule is
//! anchored at the leading position; the first rule whose pattern matches
//! *and* whose extracted digit lies in 1..=6 wins.
//!
//! `parse` is total and idempotent on its own display output. It strips every
//! leading cue, not just the first, so re-parsing display text is a no-op.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Longest parenthetical still treated as an emotion cue.
pub const MAX_CUE_LEN: usize = 40;

/// A self-reported position on the question, 1 (strongly disagree) to 6
/// (strongly agree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stance(u8);

impl Stance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Stances 4–6 count as a vote for the question.
    pub fn is_for(self) -> bool {
        self.0 >= 4
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Strongly Disagree",
            2 => "Disagree",
            3 => "Somewhat Disagree",
            4 => "Somewhat Agree",
            5 => "Agree",
            _ => "Strongly Agree",
        }
    }
}

impl TryFrom<u8> for Stance {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("stance {value} outside 1..=6"))
    }
}

impl From<Stance> for u8 {
    fn from(stance: Stance) -> Self {
        stance.0
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/6", self.0)
    }
}

/// One directive surface form: a leading-anchored pattern plus the function
/// that pulls the stance digit out of its captures.
pub struct DirectiveRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub extract: fn(&Captures<'_>) -> Option<Stance>,
}

impl DirectiveRule {
    /// Try this rule against the start of `text`.
    ///
    /// Returns the stance and the byte length of the matched directive.
    pub fn apply(&self, text: &str) -> Option<(Stance, usize)> {
        let caps = self.pattern.captures(text)?;
        let stance = (self.extract)(&caps)?;
        let len = caps.get(0).map_or(0, |m| m.end());
        Some((stance, len))
    }
}

impl fmt::Debug for DirectiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

fn first_group_digit(caps: &Captures<'_>) -> Option<Stance> {
    caps.get(1)
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .and_then(Stance::new)
}

fn rule(name: &'static str, pattern: &str) -> DirectiveRule {
    DirectiveRule {
        name,
        pattern: Regex::new(pattern).expect("directive rule regex should compile"),
        extract: first_group_digit,
    }
}

/// Directive forms in priority order.
pub static DIRECTIVE_RULES: LazyLock<Vec<DirectiveRule>> = LazyLock::new(|| {
    vec![
        rule("bracketed_colon", r"(?i)^\[\s*stance\s*:\s*(\d+)\s*\]"),
        rule("bracketed_space", r"(?i)^\[\s*stance\s+(\d+)\s*\]"),
        rule("bare_colon", r"(?i)^stance\s*:\s*(\d+)\b"),
        rule("bracketed_digit", r"^\[\s*(\d+)\s*\]"),
    ]
});

static EMOTION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\(([^()\n]{{1,{MAX_CUE_LEN}}})\)"))
        .expect("EMOTION_CUE regex should compile")
});

/// Result of parsing one turn's raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStance {
    /// Text shown to readers: no directive, no emotion cue.
    pub display_text: String,
    /// Text handed to speech synthesis: no directive, cue retained.
    pub spoken_text: String,
    pub stance: Option<Stance>,
    /// Name of the rule that produced `stance`.
    pub rule: Option<&'static str>,
}

fn match_directive(text: &str) -> Option<(Stance, usize, &'static str)> {
    DIRECTIVE_RULES
        .iter()
        .find_map(|r| r.apply(text).map(|(stance, len)| (stance, len, r.name)))
}

fn match_cue(text: &str) -> Option<(&str, usize)> {
    let caps = EMOTION_CUE.captures(text)?;
    let whole = caps.get(0)?;
    Some((whole.as_str(), whole.end()))
}

/// Extract the stance directive and emotion cue from raw turn text.
///
/// Leading directives and cues are consumed until neither applies; the first
/// directive seen supplies the stance. When nothing is consumed the input is
/// returned unchanged.
pub fn parse(raw: &str) -> ParsedStance {
    let mut rest = raw;
    let mut stance = None;
    let mut rule = None;
    let mut cues: Vec<&str> = Vec::new();
    let mut consumed = false;

    loop {
        let trimmed = rest.trim_start();
        if let Some((found, len, name)) = match_directive(trimmed) {
            if stance.is_none() {
                stance = Some(found);
                rule = Some(name);
            }
            rest = &trimmed[len..];
            consumed = true;
            continue;
        }
        if let Some((cue, len)) = match_cue(trimmed) {
            cues.push(cue);
            rest = &trimmed[len..];
            consumed = true;
            continue;
        }
        break;
    }

    if !consumed {
        return ParsedStance {
            display_text: raw.to_string(),
            spoken_text: raw.to_string(),
            stance: None,
            rule: None,
        };
    }

    let display_text = rest.trim().to_string();
    let spoken_text = if cues.is_empty() {
        display_text.clone()
    } else {
        format!("{} {}", cues.join(" "), display_text)
            .trim()
            .to_string()
    };

    ParsedStance {
        display_text,
        spoken_text,
        stance,
        rule,
    }
}

/// Display text only; used for the client-side defensive strip.
pub fn strip_markup(text: &str) -> String {
    parse(text).display_text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_named(name: &str) -> &'static DirectiveRule {
        DIRECTIVE_RULES
            .iter()
            .find(|r| r.name == name)
            .expect("rule exists")
    }

    #[test]
    fn stance_bounds() {
        assert!(Stance::new(0).is_none());
        assert!(Stance::new(7).is_none());
        assert_eq!(Stance::new(4).map(Stance::value), Some(4));
        assert!(Stance::new(4).is_some_and(Stance::is_for));
        assert!(Stance::new(3).is_some_and(|s| !s.is_for()));
        assert_eq!(Stance::new(6).map(Stance::label), Some("Strongly Agree"));
    }

    #[test]
    fn stance_serde_rejects_out_of_range() {
        let ok: Stance = serde_json::from_str("5").unwrap();
        assert_eq!(ok.value(), 5);
        assert!(serde_json::from_str::<Stance>("9").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "5");
    }

    // ── individual rules ──────────────────────────────────────────────

    #[test]
    fn bracketed_colon_rule() {
        let r = rule_named("bracketed_colon");
        assert_eq!(r.apply("[STANCE: 4] yes").map(|(s, _)| s.value()), Some(4));
        assert_eq!(r.apply("[stance:2]").map(|(s, l)| (s.value(), l)), Some((2, 10)));
        assert!(r.apply("[STANCE 4]").is_none());
        assert!(r.apply("[STANCE: 8]").is_none());
        assert!(r.apply("text [STANCE: 4]").is_none());
    }

    #[test]
    fn bracketed_space_rule() {
        let r = rule_named("bracketed_space");
        assert_eq!(r.apply("[STANCE 5] ok").map(|(s, _)| s.value()), Some(5));
        assert!(r.apply("[STANCE: 5]").is_none());
    }

    #[test]
    fn bare_colon_rule() {
        let r = rule_named("bare_colon");
        assert_eq!(r.apply("Stance: 1 no way").map(|(s, _)| s.value()), Some(1));
        assert!(r.apply("Stance: 12").is_none());
    }

    #[test]
    fn bracketed_digit_rule() {
        let r = rule_named("bracketed_digit");
        assert_eq!(r.apply("[6] absolutely").map(|(s, _)| s.value()), Some(6));
        assert!(r.apply("[0] hmm").is_none());
    }

    #[test]
    fn rules_are_ordered() {
        let names: Vec<_> = DIRECTIVE_RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["bracketed_colon", "bracketed_space", "bare_colon", "bracketed_digit"]
        );
    }

    // ── parse ─────────────────────────────────────────────────────────

    #[test]
    fn parse_directive_and_cue() {
        let parsed = parse("[STANCE: 4] (firmly) We should ship it.");
        assert_eq!(parsed.stance.map(Stance::value), Some(4));
        assert_eq!(parsed.display_text, "We should ship it.");
        assert_eq!(parsed.spoken_text, "(firmly) We should ship it.");
        assert_eq!(parsed.rule, Some("bracketed_colon"));
    }

    #[test]
    fn parse_cue_before_directive() {
        let parsed = parse("(sighing) [STANCE 2] Not again.");
        assert_eq!(parsed.stance.map(Stance::value), Some(2));
        assert_eq!(parsed.display_text, "Not again.");
        assert_eq!(parsed.spoken_text, "(sighing) Not again.");
    }

    #[test]
    fn parse_without_directive_only_strips_cue() {
        let parsed = parse("(incredulous) That is absurd.");
        assert!(parsed.stance.is_none());
        assert_eq!(parsed.display_text, "That is absurd.");

        let untouched = "Plain text with (a parenthetical) inside. ";
        let parsed = parse(untouched);
        assert!(parsed.stance.is_none());
        assert_eq!(parsed.display_text, untouched);
        assert_eq!(parsed.spoken_text, untouched);
    }

    #[test]
    fn parse_out_of_range_digit_leaves_text() {
        let text = "[STANCE: 9] Off the scale.";
        let parsed = parse(text);
        assert!(parsed.stance.is_none());
        assert_eq!(parsed.display_text, text);
    }

    #[test]
    fn parse_ignores_long_parentheticals() {
        let text = "(this is a much longer aside that is clearly part of the argument) point";
        assert_eq!(parse(text).display_text, text);
    }

    #[test]
    fn parse_strips_every_leading_cue() {
        let parsed = parse("[STANCE: 2] (quietly) (then firmly) No.");
        assert_eq!(parsed.display_text, "No.");
        assert_eq!(parse(&parsed.display_text).display_text, "No.");
    }

    #[test]
    fn parse_is_idempotent() {
        let samples = [
            "[STANCE: 4] (firmly) We should ship it.",
            "[STANCE: 4] [STANCE: 5] doubled",
            "(a) (b) stacked cues",
            "[STANCE: 9] invalid",
            "  STANCE: 3 trailing  ",
            "[5]",
            "",
            "no markup at all",
        ];
        for sample in samples {
            let once = parse(sample);
            let twice = parse(&once.display_text);
            assert_eq!(twice.display_text, once.display_text, "sample: {sample:?}");
            assert!(twice.stance.is_none() || once.stance.is_none(), "sample: {sample:?}");
        }
    }

    #[test]
    fn strip_markup_matches_display() {
        assert_eq!(strip_markup("[STANCE: 1] (coldly) No."), "No.");
    }
}
