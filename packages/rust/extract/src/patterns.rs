//! Regex candidate families: Latin model numbers, CJK names with trim
//! suffixes, quoted spans, and list/table leads.

use std::sync::LazyLock;

use regex::Regex;

use brandlens_text::table;
use brandlens_text::variants::VALID_EXTRA_TERMS;

// ---------------------------------------------------------------------------
// Model-number and name families
// ---------------------------------------------------------------------------

/// Families whose match must start and end at a word edge (line start,
/// space, CJK or punctuation).
static EDGE_FAMILIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Latin model numbers: "RAV4", "X5", "Mate50"
        r"[A-Z][A-Za-z]{0,9}\d[A-Za-z0-9_.\-]*",
        // Upper-case model codes: "CR-V", "GLC"
        r"[A-Z]{2,}-?[A-Z0-9]",
        r"Model ?[A-Z0-9]+",
        r"ID\.\d+",
        r"[A-Z][A-Za-z]+(?:PLUS|Plus|Pro|Max|Ultra|Mini|DM-i|DM-p)",
        // Capitalised product lines: "Land Cruiser Prado"
        r"[A-Z][A-Za-zÀ-ÿ']+(?:[ \t]+[A-Z][A-Za-zÀ-ÿ']+){1,2}",
        // Mixed case: "OnePlus", "ModelY"
        r"[A-Z][a-z]+[A-Z][a-z]+",
        r"[A-Z][A-Za-z]+[ \t]+\d+(?:[ \t]+[A-Z][a-z]+)?",
        r"[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+[ \t]+\d+",
        r"[A-Z]{1,3}\d{1,4}[A-Za-z]*",
        r"\d+[A-Z][A-Za-z]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Standalone capitalised words, checked for a word edge on both sides.
static STANDALONE_LATIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z][A-Za-z]{2,15}").expect("valid regex"));

/// CJK families; CJK has no word edges, so these match anywhere.
static CJK_FAMILIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[\x{4e00}-\x{9fff}]{2,6}\d{1,3}[ \t]+(?:Pro|Max|Plus|Ultra|Mini|DM-i|DM-p|EV)",
        r"[\x{4e00}-\x{9fff}]{1,6}(?:PLUS|Plus|Pro|Max|Ultra|Mini|DM-i|DM-p|EV)",
        r"[\x{4e00}-\x{9fff}]{2,6}[A-Z]?\d{1,3}",
        r"[\x{4e00}-\x{9fff}]{2,6}[A-Z]{1,3}\d?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

fn is_cjk(c: char) -> bool {
    brandlens_text::variants::is_cjk(c)
}

fn starts_at_edge(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_none_or(|c| c.is_whitespace() || is_cjk(c) || (c.is_ascii_punctuation() && c != '-' && c != '.'))
}

fn ends_at_edge(text: &str, end: usize) -> bool {
    text[end..]
        .chars()
        .next()
        .is_none_or(|c| !c.is_ascii_alphanumeric())
}

/// Candidates from the model-number and CJK name families, in text order.
pub fn regex_candidates(text: &str) -> Vec<String> {
    let mut hits: Vec<(usize, String)> = Vec::new();
    for line_start in line_offsets(text) {
        let line = line_at(text, line_start);
        for re in EDGE_FAMILIES.iter() {
            for m in re.find_iter(line) {
                if starts_at_edge(line, m.start()) && ends_at_edge(line, m.end()) {
                    hits.push((line_start + m.start(), m.as_str().to_string()));
                }
            }
        }
        for m in STANDALONE_LATIN_RE.find_iter(line) {
            if starts_at_edge(line, m.start()) && ends_at_edge(line, m.end()) {
                hits.push((line_start + m.start(), m.as_str().to_string()));
            }
        }
        for re in CJK_FAMILIES.iter() {
            for m in re.find_iter(line) {
                hits.push((line_start + m.start(), m.as_str().to_string()));
            }
        }
    }
    ordered_unique(hits)
}

// ---------------------------------------------------------------------------
// Quoted spans
// ---------------------------------------------------------------------------

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'“《【(\[]([^"'“”《》【】()\[\]\n]{2,15})["'”》】)\]]"#).expect("valid regex")
});

/// Sentence punctuation that disqualifies a quoted span.
const SENTENCE_PUNCTUATION: &[char] = &['、', '，', '。', '！', '？', '：', '；', ',', '!', '?', ';'];

/// Quoted or bracketed spans of 2 to 15 characters without sentence punctuation.
pub fn quoted_candidates(text: &str) -> Vec<String> {
    let hits = QUOTED_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| {
            let inner = m.as_str().trim();
            let len = inner.chars().count();
            ((2..=15).contains(&len) && !inner.contains(SENTENCE_PUNCTUATION))
                .then(|| (m.start(), inner.to_string()))
        })
        .collect();
    ordered_unique(hits)
}

// ---------------------------------------------------------------------------
// List and table leads
// ---------------------------------------------------------------------------

static LIST_LEAD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^[ \t]*(?:#{1,4}[ \t]*)?\d+[.、)）][ \t]*(.+)$",
        r"(?m)^[ \t]*[-*•·][ \t]+(.+)$",
        r"(?:品牌|推荐|产品|型号)[:：][ \t]*([^\n]{2,40})",
        r"\*\*([^*\n]{2,30})\*\*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Characters and separators that end an item's lead phrase.
const LEAD_DELIMITERS: &[char] = &[':', '：', '(', '（', ',', '，', '|', '。', ';', '；', '、'];

const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '《', '》', '【', '】', '「', '」'];

/// The entity phrase at the head of an item: up to the first delimiter,
/// at most three words.
fn lead_phrase(item: &str) -> String {
    let mut lead = item.replace("**", "");
    if let Some(cut) = lead.find(" - ") {
        lead.truncate(cut);
    }
    if let Some(cut) = lead.find("——") {
        lead.truncate(cut);
    }
    if let Some(cut) = lead.find(LEAD_DELIMITERS) {
        lead.truncate(cut);
    }
    lead.split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(QUOTE_CHARS)
        .trim()
        .to_string()
}

/// Leading entity phrases of list items and table rows.
///
/// Multi-word leads also contribute their words, except when the last word
/// is a trim term ("Song Plus"), in which case only the whole lead is kept.
pub fn list_candidates(text: &str) -> Vec<String> {
    let mut leads: Vec<(usize, String)> = Vec::new();
    for re in LIST_LEAD_RES.iter() {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                leads.push((m.start(), lead_phrase(m.as_str())));
            }
        }
    }
    let table_offset = table::first_table_index(text).unwrap_or(0);
    for (row, cells) in table::table_rows(text).into_iter().enumerate() {
        if let Some(cell) = cells
            .into_iter()
            .find(|cell| !cell.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '#'))
        {
            leads.push((table_offset + row, lead_phrase(&cell)));
        }
    }

    let mut hits = Vec::new();
    for (pos, lead) in leads {
        let len = lead.chars().count();
        if !(2..=30).contains(&len) {
            continue;
        }
        let parts: Vec<&str> = lead.split_whitespace().collect();
        let keeps_whole = parts.len() > 1
            && parts
                .last()
                .is_some_and(|last| VALID_EXTRA_TERMS.contains(&last.to_lowercase().as_str()));
        if parts.len() > 1 && !keeps_whole {
            for part in &parts {
                if part.chars().count() >= 2 {
                    hits.push((pos, (*part).to_string()));
                }
            }
        }
        hits.push((pos, lead));
    }
    ordered_unique(hits)
}

// ---------------------------------------------------------------------------
// Subtokens
// ---------------------------------------------------------------------------

static SUBTOKEN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"[A-Za-z]{1,10}\.?\d[A-Za-z0-9_.\-]*", r"Model ?[A-Za-z0-9]+"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

/// Model-number tokens embedded in longer names ("特斯拉Model Y" → "Model Y").
pub fn expand_subtokens<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut hits = Vec::new();
    for (index, name) in names.into_iter().enumerate() {
        for re in SUBTOKEN_RES.iter() {
            for m in re.find_iter(name) {
                if m.as_str() != name {
                    hits.push((index, m.as_str().to_string()));
                }
            }
        }
    }
    ordered_unique(hits)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn line_offsets(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .filter(|i| *i <= text.len())
        .collect()
}

fn line_at(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    rest.split('\n').next().unwrap_or(rest)
}

/// Trim (including trailing `.`/`-`), drop one-character hits, sort by position, keep first occurrences.
fn ordered_unique(mut hits: Vec<(usize, String)>) -> Vec<String> {
    hits.sort_by_key(|(pos, _)| *pos);
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .map(|(_, name)| name.trim().trim_end_matches(['.', '-']).to_string())
        .filter(|name| name.chars().count() >= 2)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_model_numbers() {
        let hits = regex_candidates("推荐 RAV4 和 CR-V，还有 Model Y 与 ID.4");
        for expected in ["RAV4", "CR-V", "Model Y", "ID.4"] {
            assert!(hits.iter().any(|h| h == expected), "missing {expected} in {hits:?}");
        }
    }

    #[test]
    fn cjk_with_trim_suffix() {
        let hits = regex_candidates("比亚迪宋PLUS DM-i 和 汉EV 都不错");
        assert!(hits.iter().any(|h| h.ends_with("宋PLUS")), "{hits:?}");
        assert!(hits.iter().any(|h| h == "汉EV"), "{hits:?}");
    }

    #[test]
    fn mid_word_matches_are_skipped() {
        let hits = regex_candidates("the iPhone14 is popular");
        assert!(!hits.iter().any(|h| h == "Phone14"), "{hits:?}");
    }

    #[test]
    fn standalone_words_need_edges() {
        let hits = regex_candidates("Toyota Honda");
        assert!(hits.iter().any(|h| h == "Toyota"));
        assert!(hits.iter().any(|h| h == "Honda"));
    }

    #[test]
    fn quoted_spans() {
        let hits = quoted_candidates("他推荐了\"小鹏G6\"和[ID.4]，以及\"这个车很好,真的\"");
        assert_eq!(hits, vec!["小鹏G6", "ID.4"]);
        assert!(quoted_candidates("\"x\"").is_empty());
        assert!(quoted_candidates("\"一二三四五六七八九十一二三四五六\"").is_empty());
    }

    #[test]
    fn list_leads_and_words() {
        let text = "1. Honda CRV - reliable\n2. Toyota RAV4: efficient\n- BYD Song Plus\n3、比亚迪";
        let hits = list_candidates(text);
        assert!(hits.contains(&"Honda".to_string()), "{hits:?}");
        assert!(hits.contains(&"Toyota".to_string()), "{hits:?}");
        assert!(hits.contains(&"比亚迪".to_string()), "{hits:?}");
        assert!(hits.contains(&"BYD Song Plus".to_string()), "{hits:?}");
        assert!(!hits.contains(&"Song".to_string()), "{hits:?}");
    }

    #[test]
    fn table_first_cells() {
        let text = "| # | 品牌 | 车型 |\n|---|---|---|\n| 1 | 比亚迪 | 宋PLUS |\n| 2 | 特斯拉 | Model Y |";
        let hits = list_candidates(text);
        assert!(hits.contains(&"比亚迪".to_string()), "{hits:?}");
        assert!(hits.contains(&"特斯拉".to_string()), "{hits:?}");
    }

    #[test]
    fn subtokens() {
        let hits = expand_subtokens(["比亚迪宋PLUS DM-i 2024", "特斯拉Model Y"]);
        assert!(hits.contains(&"Model Y".to_string()), "{hits:?}");
    }
}
