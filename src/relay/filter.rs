//! Forwarding predicate.
//!
//! A post qualifies when it carries the required link, at least one valid
//! marker, and none of the forbidden terms as a whole word.

use std::fmt;

use regex::Regex;

/// Build a case-insensitive alternation that matches any of `terms` as a whole word.
///
/// Word boundaries are only asserted on sides where the term itself starts or
/// ends with a word character, so terms like `#ad` still match.
pub fn whole_word_pattern<S: AsRef<str>>(terms: &[S]) -> Option<String> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(|term| {
            let starts_word = term.chars().next().is_some_and(is_word_char);
            let ends_word = term.chars().last().is_some_and(is_word_char);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(term),
                if ends_word { r"\b" } else { "" },
            )
        })
        .collect();

    if alternatives.is_empty() {
        None
    } else {
        Some(format!("(?i)(?:{})", alternatives.join("|")))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Why a post was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    MissingLink,
    MissingMarker,
    /// Contains a forbidden term (as written in the post).
    Forbidden(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty text"),
            Self::MissingLink => write!(f, "no link matching the required pattern"),
            Self::MissingMarker => write!(f, "no valid marker"),
            Self::Forbidden(term) => write!(f, "forbidden term '{}'", term),
        }
    }
}

/// Result of evaluating a post against the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Immutable filter configuration.
#[derive(Debug, Clone)]
pub struct FilterRules {
    link_pattern: Regex,
    valid_markers: Vec<String>,
    forbidden_terms: Vec<String>,
    forbidden: Option<Regex>,
    strip_link_before_check: bool,
}

impl FilterRules {
    pub fn new(
        link_pattern: &str,
        valid_markers: Vec<String>,
        forbidden_terms: Vec<String>,
        strip_link_before_check: bool,
    ) -> Result<Self, regex::Error> {
        let link_pattern = Regex::new(link_pattern)?;
        let forbidden = whole_word_pattern(&forbidden_terms)
            .map(|p| Regex::new(&p))
            .transpose()?;

        Ok(Self {
            link_pattern,
            valid_markers: valid_markers.into_iter().filter(|m| !m.is_empty()).collect(),
            forbidden_terms,
            forbidden,
            strip_link_before_check,
        })
    }

    pub fn link_pattern(&self) -> &Regex {
        &self.link_pattern
    }

    pub fn forbidden_terms(&self) -> &[String] {
        &self.forbidden_terms
    }

    /// Evaluate a post, reporting the first failed check.
    pub fn evaluate(&self, text: &str) -> Verdict {
        if text.trim().is_empty() {
            return Verdict::Reject(RejectReason::Empty);
        }

        if !self.link_pattern.is_match(text) {
            return Verdict::Reject(RejectReason::MissingLink);
        }

        if !self.valid_markers.iter().any(|m| text.contains(m.as_str())) {
            return Verdict::Reject(RejectReason::MissingMarker);
        }

        if let Some(forbidden) = &self.forbidden {
            let haystack = if self.strip_link_before_check {
                self.link_pattern.replace_all(text, " ")
            } else {
                text.into()
            };
            if let Some(m) = forbidden.find(&haystack) {
                return Verdict::Reject(RejectReason::Forbidden(m.as_str().to_string()));
            }
        }

        Verdict::Accept
    }

    /// Boolean form of [`FilterRules::evaluate`]. The relay calls `evaluate`
    /// directly so it can log the reason; this is for callers holding a raw,
    /// possibly absent, message text.
    #[allow(dead_code)]
    pub fn should_forward(&self, text: Option<&str>) -> bool {
        text.is_some_and(|t| self.evaluate(t).is_accept())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = r"https://app\.binance\.com/uni-qr/cart/\d+";

    fn rules(strip: bool) -> FilterRules {
        FilterRules::new(
            LINK,
            vec!["Answer:".into(), "USDT".into()],
            vec!["box".into()],
            strip,
        )
        .unwrap()
    }

    #[test]
    fn test_accepts_qualifying_post() {
        let text = "DOGE Answer: 42\n#square\nhttps://app.binance.com/uni-qr/cart/12345";
        assert!(rules(true).should_forward(Some(text)));
    }

    #[test]
    fn test_rejects_empty_and_missing() {
        let r = rules(true);
        assert!(!r.should_forward(None));
        assert_eq!(r.evaluate("   \n"), Verdict::Reject(RejectReason::Empty));
        assert_eq!(
            r.evaluate("Answer: 42 with no link"),
            Verdict::Reject(RejectReason::MissingLink)
        );
        assert_eq!(
            r.evaluate("hello https://app.binance.com/uni-qr/cart/1"),
            Verdict::Reject(RejectReason::MissingMarker)
        );
    }

    #[test]
    fn test_link_needs_numeric_segment() {
        let text = "Answer: 1 https://app.binance.com/uni-qr/cart/abc";
        assert_eq!(rules(true).evaluate(text), Verdict::Reject(RejectReason::MissingLink));
    }

    #[test]
    fn test_forbidden_whole_word_any_case() {
        let r = rules(true);
        let text = "DOGE Answer: 42 BOX\nhttps://app.binance.com/uni-qr/cart/12345";
        assert_eq!(
            r.evaluate(text),
            Verdict::Reject(RejectReason::Forbidden("BOX".into()))
        );
    }

    #[test]
    fn test_forbidden_ignores_larger_tokens() {
        let text = "Answer: 42 inbox boxes\nhttps://app.binance.com/uni-qr/cart/12345";
        assert!(rules(true).should_forward(Some(text)));
    }

    #[test]
    fn test_strip_link_before_check() {
        let pattern = r"https://example\.com/box/\d+";
        let text = "Answer: 7 https://example.com/box/99";

        let strip = FilterRules::new(pattern, vec!["Answer:".into()], vec!["box".into()], true).unwrap();
        let keep = FilterRules::new(pattern, vec!["Answer:".into()], vec!["box".into()], false).unwrap();

        assert!(strip.should_forward(Some(text)));
        assert!(!keep.should_forward(Some(text)));
    }

    #[test]
    fn test_whole_word_pattern_symbol_terms() {
        let pattern = whole_word_pattern(&["#ad", "  "]).unwrap();
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("promo #AD here"));
        assert!(whole_word_pattern::<&str>(&[]).is_none());
    }
}
