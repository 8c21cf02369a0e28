//! List detection, item splitting and expected-count parsing.
//!
//! Answers are often ranked lists. Items are split at top-level markers;
//! bullets nested under a numbered parent stay attached to it.

use std::sync::LazyLock;

use regex::Regex;

use crate::table;

/// Kinds of line markers, in decreasing precedence for top-level items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Numbered,
    Lettered,
    Bullet,
}

/// A recognised list marker at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// Leading whitespace width (tabs count as four).
    pub indent: usize,
    /// Byte offset where the item body starts.
    pub body_start: usize,
}

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*(?:#{1,4}[ \t]*\**[ \t]*\d+[.)][ \t]*\**[ \t]*|\d+[.)）][ \t]+|\d+、[ \t]*|[一二三四五六七八九十]+、[ \t]*|\(\d+\)[ \t]*)",
    )
    .expect("valid regex")
});

static LETTERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*[a-zA-Z][.)][ \t]+").expect("valid regex"));

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:[-*•·][ \t]+|[・○→][ \t]*)").expect("valid regex")
});

/// Recognise a list marker at the start of `line`.
pub fn marker(line: &str) -> Option<Marker> {
    let (kind, m) = if let Some(m) = NUMBERED_RE.find(line) {
        (MarkerKind::Numbered, m)
    } else if let Some(m) = LETTERED_RE.find(line) {
        (MarkerKind::Lettered, m)
    } else if let Some(m) = BULLET_RE.find(line) {
        (MarkerKind::Bullet, m)
    } else {
        return None;
    };
    if line[m.end()..].trim().is_empty() {
        return None;
    }
    Some(Marker {
        kind,
        indent: indent_width(line),
        body_start: m.end(),
    })
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// A markdown table with two data rows, or at least two marker lines.
pub fn is_list_format(text: &str) -> bool {
    if table::has_min_data_rows(text, 2) {
        return true;
    }
    text.lines().filter(|line| marker(line).is_some()).count() >= 2
}

/// Ordered top-level items, without markers. Empty when `text` is not a list.
///
/// Table rows take precedence over line markers. Text before the first item
/// is an intro and is dropped.
pub fn split_into_list_items(text: &str) -> Vec<String> {
    if !is_list_format(text) {
        return Vec::new();
    }
    if table::has_min_data_rows(text, 2) {
        return table::table_row_items(text);
    }

    let markers: Vec<(usize, Marker)> = text
        .lines()
        .enumerate()
        .filter_map(|(i, line)| marker(line).map(|m| (i, m)))
        .collect();

    let top_kind = [MarkerKind::Numbered, MarkerKind::Lettered, MarkerKind::Bullet]
        .into_iter()
        .find(|kind| markers.iter().filter(|(_, m)| m.kind == *kind).count() >= 2)
        .or_else(|| markers.first().map(|(_, m)| m.kind));
    let Some(top_kind) = top_kind else {
        return Vec::new();
    };
    let top_indent = markers
        .iter()
        .filter(|(_, m)| m.kind == top_kind)
        .map(|(_, m)| m.indent)
        .min()
        .unwrap_or(0);

    let mut items: Vec<Vec<String>> = Vec::new();
    for line in text.lines() {
        let is_top = marker(line).is_some_and(|m| m.kind == top_kind && m.indent <= top_indent);
        if is_top {
            let m = marker(line).map(|m| m.body_start).unwrap_or(0);
            items.push(vec![line[m..].trim().to_string()]);
        } else if let Some(current) = items.last_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                current.push(trimmed.to_string());
            }
        }
    }

    items
        .into_iter()
        .map(|lines| lines.join("\n"))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Number of top-level items (0 for non-list text).
pub fn list_item_count(text: &str) -> usize {
    split_into_list_items(text).len()
}

/// Text before the first list marker or table, if any.
pub fn intro_text(text: &str) -> Option<String> {
    let marker_idx = text
        .lines()
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len() + 1;
            Some((start, line))
        })
        .find(|(_, line)| marker(line).is_some())
        .map(|(start, _)| start);
    let first = match (marker_idx, table::first_table_index(text)) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let intro = text[..first].trim();
    (!intro.is_empty()).then(|| intro.to_string())
}

// ---------------------------------------------------------------------------
// Expected count
// ---------------------------------------------------------------------------

/// Only the head of an answer announces how many items follow.
const EXPECTED_COUNT_SCAN_CHARS: usize = 500;

static EXPECTED_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        top[\s-]*(?P<a>\d{1,3})(?:\D|$)
        | best\s+(?P<b>\d{1,3})(?:\D|$)
        | (?:^|[^\d])(?P<c>\d{1,3})\s+(?:best|top)\b
        | 推荐\s*(?P<d>\d{1,3})\s*[款个家种]
        | 排名前\s*(?P<e>\d{1,3})(?:\D|$)
        | 前\s*(?P<f>\d{1,3})\s*名
        | (?:^|[^\d])(?P<g>\d{1,3})\s*(?:大|款|个|强)
        | 前(?P<h>[一二两三四五六七八九十]+)名
        | (?P<i>[一二两三四五六七八九十]+)(?:大|款|强)
        ",
    )
    .expect("valid regex")
});

/// Parse an announced item count ("TOP 10", "推荐10款", "十大").
///
/// Searches the first 500 characters; the earliest phrase wins.
pub fn parse_expected_count(text: &str) -> Option<usize> {
    if text.is_empty() {
        return None;
    }
    let head: String = text.chars().take(EXPECTED_COUNT_SCAN_CHARS).collect();
    let caps = EXPECTED_COUNT_RE.captures(&head)?;
    for name in ["a", "b", "c", "d", "e", "f", "g"] {
        if let Some(m) = caps.name(name) {
            return m.as_str().parse().ok().filter(|n| *n > 0);
        }
    }
    for name in ["h", "i"] {
        if let Some(m) = caps.name(name) {
            return parse_chinese_numeral(m.as_str());
        }
    }
    None
}

/// Parse 一..九十九 written with 十.
pub fn parse_chinese_numeral(s: &str) -> Option<usize> {
    fn digit(c: char) -> Option<usize> {
        Some(match c {
            '一' => 1,
            '二' | '两' => 2,
            '三' => 3,
            '四' => 4,
            '五' => 5,
            '六' => 6,
            '七' => 7,
            '八' => 8,
            '九' => 9,
            _ => return None,
        })
    }

    let chars: Vec<char> = s.chars().collect();
    match chars.as_slice() {
        [] => None,
        ['十'] => Some(10),
        ['十', ones] => digit(*ones).map(|o| 10 + o),
        [tens, '十'] => digit(*tens).map(|t| t * 10),
        [tens, '十', ones] => Some(digit(*tens)? * 10 + digit(*ones)?),
        [single] => digit(*single),
        _ => None,
    }
}
