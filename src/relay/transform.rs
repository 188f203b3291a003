//! Text rewriting for qualifying posts.
//!
//! The cleanup keeps the canonical link exactly once, strips forbidden terms
//! and (unless formatting is preserved) normalises whitespace line by line.

use regex::Regex;
use tracing::warn;

use super::filter::{FilterRules, whole_word_pattern};
use super::qr::{self, QrStyle};

/// Label spellings for the answer field, in priority order.
pub const DEFAULT_ANSWER_LABELS: &[&str] = &["Answer:", "𝗔𝗻𝘀𝘄𝗲𝗿:"];

/// Shape of the outgoing text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardStyle {
    /// The source text after cleanup.
    #[default]
    Cleaned,
    /// Fixed card layout built from the extracted fields.
    Card,
}

#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub preserve_original_formatting: bool,
    pub answer_labels: Vec<String>,
    pub answer_placeholder: String,
    pub style: ForwardStyle,
    pub card_hashtags: String,
    /// `None` disables QR rendering.
    pub qr: Option<QrStyle>,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            preserve_original_formatting: false,
            answer_labels: DEFAULT_ANSWER_LABELS.iter().map(|s| s.to_string()).collect(),
            answer_placeholder: "N/A".to_string(),
            style: ForwardStyle::Cleaned,
            card_hashtags: "#square #slot".to_string(),
            qr: Some(QrStyle::default()),
        }
    }
}

/// Output of [`Transformer::transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub text: String,
    pub link: Option<String>,
    pub answer: String,
    /// PNG payload, when a link was found and rendering succeeded.
    pub attachment: Option<Vec<u8>>,
}

/// Patterns for the card layout.
#[derive(Debug, Clone)]
struct CardPatterns {
    ticker: Regex,
    amount: Regex,
    usdt: Regex,
    copy: Regex,
    bangs: Regex,
}

impl CardPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ticker: Regex::new(r"^([A-Z]+)")?,
            amount: Regex::new(r"\d+ \| ~[\d.]+ [A-Z]+")?,
            usdt: Regex::new(r"~[\d.]+ USDT")?,
            copy: Regex::new(r"copy\s*[^\w\s]*")?,
            bangs: Regex::new(r"!+")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Transformer {
    link_pattern: Regex,
    /// Forbidden term with a trailing separator or joiner, or wrapped in brackets.
    forbidden: Option<Regex>,
    spaces: Regex,
    space_before_punct: Regex,
    card: CardPatterns,
    settings: TransformSettings,
}

impl Transformer {
    pub fn new(rules: &FilterRules, settings: TransformSettings) -> Result<Self, regex::Error> {
        let forbidden = whole_word_pattern(rules.forbidden_terms())
            .map(|p| {
                let term = format!("(?:{p})");
                Regex::new(&format!(
                    r"\([^\S\n]*{term}[^\S\n]*\)|\[[^\S\n]*{term}[^\S\n]*\]|{term}(?:[,;:]|-)?"
                ))
            })
            .transpose()?;

        Ok(Self {
            link_pattern: rules.link_pattern().clone(),
            forbidden,
            spaces: Regex::new(r"[^\S\n]{2,}")?,
            space_before_punct: Regex::new(r"[^\S\n]+([,.;:!?])")?,
            card: CardPatterns::new()?,
            settings,
        })
    }

    /// Rewrite a post and derive its attachment.
    pub fn transform(&self, text: &str) -> TransformResult {
        let (cleaned, link) = self.clean(text);
        let answer = self.extract_answer(&cleaned, link.as_deref());

        let text = match self.settings.style {
            ForwardStyle::Cleaned => cleaned,
            ForwardStyle::Card => self.render_card(text, &answer, link.as_deref()),
        };

        let attachment = match (&link, &self.settings.qr) {
            (Some(link), Some(style)) => match qr::render_link(link, style) {
                Ok(png) => Some(png),
                Err(e) => {
                    warn!("QR rendering failed for {}: {}", link, e);
                    None
                }
            },
            _ => None,
        };

        TransformResult {
            text,
            link,
            answer,
            attachment,
        }
    }

    /// Clean the text and return it together with the first link match.
    ///
    /// Only the text between link matches is rewritten; links pass through
    /// untouched. Repeats of the canonical link are dropped.
    pub fn clean(&self, text: &str) -> (String, Option<String>) {
        let link = self.link_pattern.find(text).map(|m| m.as_str().to_string());

        // gaps[i] precedes links[i]; the final gap follows the last link.
        let mut gaps = Vec::new();
        let mut links = Vec::new();
        let mut current = String::new();
        let mut canonical_placed = false;
        let mut last = 0;
        for m in self.link_pattern.find_iter(text) {
            current.push_str(&text[last..m.start()]);
            last = m.end();

            let is_canonical = link.as_deref() == Some(m.as_str());
            if is_canonical && canonical_placed {
                continue;
            }
            canonical_placed |= is_canonical;
            gaps.push(std::mem::take(&mut current));
            links.push(m.as_str());
        }
        current.push_str(&text[last..]);
        gaps.push(current);

        let count = gaps.len();
        let mut out = String::with_capacity(text.len());
        for (i, gap) in gaps.iter().enumerate() {
            let (at_start, at_end) = (i == 0, i + 1 == count);
            let gap = match &self.forbidden {
                Some(forbidden) => strip_terms(forbidden, gap, at_start, at_end),
                None => gap.clone(),
            };
            if self.settings.preserve_original_formatting {
                out.push_str(&gap);
            } else {
                out.push_str(&self.normalize(&gap, at_start, at_end));
            }
            if let Some(link) = links.get(i) {
                out.push_str(link);
            }
        }

        (out, link)
    }

    /// Trim lines, drop blank ones, collapse runs of spaces.
    ///
    /// `gap` may sit between links: its first and last fragments continue a
    /// line that holds a link unless `at_start` / `at_end` says otherwise.
    fn normalize(&self, gap: &str, at_start: bool, at_end: bool) -> String {
        let fragments: Vec<&str> = gap.split('\n').collect();
        let last = fragments.len() - 1;

        let mut kept = Vec::with_capacity(fragments.len());
        for (i, fragment) in fragments.iter().enumerate() {
            let opens_line = i > 0 || at_start;
            let closes_line = i < last || at_end;

            let line = self.spaces.replace_all(fragment, " ");
            let mut line = self.space_before_punct.replace_all(&line, "$1").into_owned();
            if opens_line {
                line = line.trim_start().to_string();
            }
            if closes_line {
                line = line.trim_end().to_string();
            }

            if line.is_empty() && opens_line && closes_line {
                continue;
            }
            kept.push(line);
        }
        kept.join("\n")
    }

    /// Pull the labelled answer out of `text`, falling back to the placeholder.
    pub fn extract_answer(&self, text: &str, link: Option<&str>) -> String {
        let found = self.settings.answer_labels.iter().find_map(|label| {
            text.find(label.as_str()).map(|pos| &text[pos + label.len()..])
        });

        let Some(rest) = found else {
            return self.settings.answer_placeholder.clone();
        };

        let mut parts = Vec::new();
        for (i, line) in rest.split('\n').enumerate() {
            if i > 0 && line.trim_start().starts_with('#') {
                break;
            }
            let cut = match link.and_then(|l| line.find(l)) {
                Some(pos) => Some(pos),
                None => self.link_pattern.find(line).map(|m| m.start()),
            };
            match cut {
                Some(pos) => {
                    parts.push(&line[..pos]);
                    break;
                }
                None => parts.push(line),
            }
        }

        let answer = parts.join("\n").trim().to_string();
        if answer.is_empty() {
            self.settings.answer_placeholder.clone()
        } else {
            answer
        }
    }

    /// Render the card layout from the original post.
    fn render_card(&self, source: &str, answer: &str, link: Option<&str>) -> String {
        let card = &self.card;
        let ticker = card
            .ticker
            .captures(source.trim_start())
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "CRYPTO".to_string());
        let amount = card.amount.find(source).map(|m| m.as_str()).unwrap_or("");
        let usdt = card.usdt.find(source).map(|m| m.as_str()).unwrap_or("");

        let answer = card.copy.replace_all(answer, "");
        let answer = card.bangs.replace_all(&answer, "❕");
        let answer = answer.trim();

        let mut out = format!(
            "❤️‍🩹 {ticker} ❤️‍🩹\n💎 {amount}\n💰 {usdt}\n\nAnswer:\n{answer}❕{answer}❕\n\n{}",
            self.settings.card_hashtags
        );
        if let Some(link) = link {
            out.push('\n');
            out.push_str(link);
        }
        out
    }
}

/// Remove every match of `terms` from `text` and mend the gap it leaves.
///
/// The blanks around a removed term collapse to the separator already in
/// place; nothing is left dangling before punctuation or a line end. A
/// `text` edge that is not `at_start` / `at_end` borders a link.
fn strip_terms(terms: &Regex, text: &str, at_start: bool, at_end: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(m) = terms.find_at(text, pos) {
        out.push_str(&text[pos..m.start()]);
        let rest = &text[m.end()..];
        let trail = rest.len() - rest.trim_start_matches(is_blank).len();
        pos = m.end() + trail;

        let next = text[pos..].chars().next();
        let kept = out.trim_end_matches(is_blank).len();
        let had_lead = kept < out.len();
        let prev = out[..kept].chars().next_back();

        let ends_clause = next.map_or(at_end, closes_clause);
        let starts_line = prev.map_or(at_start, |c| c == '\n');

        if ends_clause {
            out.truncate(kept);
        } else if had_lead || starts_line {
            // Separator or indentation already in place.
        } else if trail > 0 && !prev.is_some_and(|c| "([{".contains(c)) {
            out.push(' ');
        }
    }
    out.push_str(&text[pos..]);
    out
}

fn is_blank(c: char) -> bool {
    c.is_whitespace() && c != '\n'
}

fn closes_clause(c: char) -> bool {
    c == '\n' || ",.;:!?)]}".contains(c)
}
