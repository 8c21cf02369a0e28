//! Text normalization for model answers.
//!
//! Each pass is a function `&str -> String` applied in sequence. The
//! pipeline folds full-width forms and CJK punctuation, optionally converts
//! traditional characters to simplified, and collapses whitespace.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::script::TRADITIONAL_TO_SIMPLIFIED;

// ---------------------------------------------------------------------------
// Script conversion
// ---------------------------------------------------------------------------

/// Converts between Chinese script forms.
///
/// Chosen once when the [`Normalizer`] is built, never per call.
pub trait ScriptConverter: Send + Sync {
    fn convert(&self, s: &str) -> String;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Leaves text untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConverter;

impl ScriptConverter for IdentityConverter {
    fn convert(&self, s: &str) -> String {
        s.to_string()
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Character-table traditional → simplified conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableConverter;

static T2S: LazyLock<HashMap<char, char>> =
    LazyLock::new(|| TRADITIONAL_TO_SIMPLIFIED.iter().copied().collect());

impl ScriptConverter for TableConverter {
    fn convert(&self, s: &str) -> String {
        s.chars().map(|c| *T2S.get(&c).unwrap_or(&c)).collect()
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Text normalizer carrying its script converter.
pub struct Normalizer {
    converter: Box<dyn ScriptConverter>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("converter", &self.converter.name())
            .finish()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Box::new(IdentityConverter))
    }
}

impl Normalizer {
    pub fn new(converter: Box<dyn ScriptConverter>) -> Self {
        Self { converter }
    }

    /// Table conversion when enabled, identity otherwise.
    pub fn with_script_conversion(enabled: bool) -> Self {
        if enabled {
            Self::new(Box::new(TableConverter))
        } else {
            Self::default()
        }
    }

    /// Normalize a single span of text onto one line.
    ///
    /// Idempotent. Empty input comes back unchanged.
    pub fn normalize(&self, s: &str) -> String {
        if s.is_empty() {
            return String::new();
        }
        let mut result = fold_width(s);
        result = fold_punctuation(&result);
        result = self.converter.convert(&result);
        collapse_whitespace(&result)
    }

    /// Normalize every line independently, keeping line structure for list detection.
    pub fn normalize_lines(&self, s: &str) -> String {
        s.lines()
            .map(|line| {
                let indent: String = line
                    .chars()
                    .take_while(|c| *c == ' ' || *c == '\t')
                    .collect();
                let body = self.normalize(line);
                if body.is_empty() {
                    body
                } else {
                    format!("{indent}{body}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Key used to compare two surface forms for equality.
    ///
    /// Script conversion, NFKC, lowercase, and removal of every
    /// non-alphanumeric character (spaces, dots, dashes, slashes, bullets).
    pub fn comparison_key(&self, s: &str) -> String {
        let converted = self.converter.convert(s);
        converted
            .nfkc()
            .flat_map(char::to_lowercase)
            .filter(|c| c.is_alphanumeric())
            .collect()
    }
}

/// Store lookup key: parenthesised asides dropped, NFKC, alphanumerics only, lowercase.
pub fn entity_key(s: &str) -> String {
    static ASIDE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\([^)]*\)|（[^）]*）").expect("valid regex"));

    let stripped = ASIDE_RE.replace_all(s, "");
    stripped
        .nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 1: full-width → half-width
// ---------------------------------------------------------------------------

/// Fold full-width ASCII variants (U+FF01..U+FF5E) and wide spaces.
pub fn fold_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' | '\u{00A0}' => ' ',
            _ => c,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 2: CJK punctuation → ASCII
// ---------------------------------------------------------------------------

/// Fold CJK and typographic punctuation to ASCII equivalents.
///
/// The enumeration comma `、` is kept: it marks list items (`1、`).
pub fn fold_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '，' => out.push(','),
            '。' => out.push('.'),
            '！' => out.push('!'),
            '？' => out.push('?'),
            '：' => out.push(':'),
            '；' => out.push(';'),
            '“' | '”' | '「' | '」' | '『' | '』' => out.push('"'),
            '‘' | '’' => out.push('\''),
            '【' => out.push('['),
            '】' => out.push(']'),
            '《' => out.push('<'),
            '》' => out.push('>'),
            '—' => out.push('-'),
            '…' => out.push_str("..."),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Pass 3: whitespace
// ---------------------------------------------------------------------------

/// Collapse whitespace runs to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<&'static str> {
        vec![
            "",
            "   ",
            "ＢＹＤ　宋ＰＬＵＳ（ＤＭ－ｉ）",
            "推荐：比亚迪、特斯拉，以及“大众”。",
            "【Model Y】《理想L9》……",
            "豐田 凱美瑞\u{00A0}\u{00A0}2024款",
            "  multiple   spaces\tand\nnewlines ",
            "Ｔｏｐ１０ 品牌—对比",
        ]
    }

    #[test]
    fn normalize_is_idempotent() {
        for normalizer in [Normalizer::default(), Normalizer::with_script_conversion(true)] {
            for s in samples() {
                let once = normalizer.normalize(s);
                let twice = normalizer.normalize(&once);
                assert_eq!(once, twice, "not idempotent for {s:?}");
            }
        }
    }

    #[test]
    fn empty_input_is_returned_unchanged() {
        assert_eq!(Normalizer::default().normalize(""), "");
    }

    #[test]
    fn folds_full_width_and_punctuation() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("ＢＹＤ　宋ＰＬＵＳ"), "BYD 宋PLUS");
        assert_eq!(n.normalize("比亚迪、特斯拉，好！"), "比亚迪、特斯拉,好!");
        assert_eq!(n.normalize("「大众」【ID.4】"), "\"大众\"[ID.4]");
        assert_eq!(n.normalize("等等…"), "等等...");
    }

    #[test]
    fn script_conversion_is_optional() {
        let identity = Normalizer::default();
        let table = Normalizer::with_script_conversion(true);
        assert_eq!(identity.normalize("豐田"), "豐田");
        assert_eq!(table.normalize("豐田"), "丰田");
        assert_eq!(table.normalize("大眾"), "大众");
    }

    #[test]
    fn normalize_lines_keeps_structure() {
        let n = Normalizer::default();
        let text = "Intro：\n1. ＢＹＤ\n    * 宋ＰＬＵＳ\n\n2. Tesla";
        let out = n.normalize_lines(text);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Intro:");
        assert_eq!(lines[1], "1. BYD");
        assert_eq!(lines[2], "    * 宋PLUS");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "2. Tesla");
    }

    #[test]
    fn comparison_key_strips_separators() {
        let n = Normalizer::with_script_conversion(true);
        assert_eq!(n.comparison_key("Model Y"), "modely");
        assert_eq!(n.comparison_key("Mercedes-Benz"), "mercedesbenz");
        assert_eq!(n.comparison_key("大眾·汽車"), "大众汽车");
        assert_eq!(n.comparison_key("ＩＤ．４"), "id4");
    }

    #[test]
    fn entity_key_drops_asides() {
        assert_eq!(entity_key("Volkswagen (大众)"), "volkswagen");
        assert_eq!(entity_key("比亚迪（BYD）"), "比亚迪");
        assert_eq!(entity_key("Lynk & Co"), "lynkco");
        assert_eq!(entity_key(""), "");
    }
}
