//! Markdown table detection and row extraction.

use std::sync::LazyLock;

use regex::Regex;

/// A header row followed by a `---|---` separator row.
static HEADER_AND_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\|?.*\|.*\|?[ \t]*\n[ \t]*\|?[ \t]*:?-+:?[ \t]*(?:\|[ \t]*:?-+:?[ \t]*)+\|?[ \t]*$")
        .expect("valid regex")
});

/// Byte offset where the first table begins, if any.
pub fn first_table_index(text: &str) -> Option<usize> {
    HEADER_AND_SEPARATOR_RE.find(text).map(|m| m.start())
}

/// Header + separator followed by at least `min_rows` pipe rows.
pub fn has_min_data_rows(text: &str, min_rows: usize) -> bool {
    HEADER_AND_SEPARATOR_RE
        .find_iter(text)
        .any(|m| data_rows_after(&text[m.end()..]).len() >= min_rows)
}

/// Data rows of every table in `text`, each split into non-empty cells.
pub fn table_rows(text: &str) -> Vec<Vec<String>> {
    HEADER_AND_SEPARATOR_RE
        .find_iter(text)
        .flat_map(|m| data_rows_after(&text[m.end()..]))
        .map(|line| split_cells(line))
        .filter(|cells| !cells.is_empty())
        .collect()
}

/// Each data row joined as one list item: `"cell | cell"`.
pub fn table_row_items(text: &str) -> Vec<String> {
    table_rows(text)
        .into_iter()
        .map(|cells| cells.join(" | "))
        .collect()
}

/// Consecutive pipe rows after a separator; leading blank lines are skipped.
fn data_rows_after(rest: &str) -> Vec<&str> {
    let mut rows = Vec::new();
    let mut started = false;
    for line in rest.lines() {
        if line.trim().is_empty() {
            if started {
                break;
            }
            continue;
        }
        started = true;
        if line.matches('|').count() < 2 {
            break;
        }
        rows.push(line);
    }
    rows
}

fn split_cells(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
推荐如下：

| 排名 | 品牌 | 车型 |
|---|:---:|---|
| 1 | 比亚迪 | 宋PLUS |
| 2 | 特斯拉 | Model Y |

以上仅供参考。";

    #[test]
    fn detects_table_with_rows() {
        assert!(has_min_data_rows(TABLE, 2));
        assert!(!has_min_data_rows(TABLE, 3));
        assert_eq!(first_table_index(TABLE), TABLE.find("| 排名"));
    }

    #[test]
    fn extracts_row_items() {
        let items = table_row_items(TABLE);
        assert_eq!(items, vec!["1 | 比亚迪 | 宋PLUS", "2 | 特斯拉 | Model Y"]);
    }

    #[test]
    fn plain_text_has_no_table() {
        assert!(!has_min_data_rows("a | b\nno separator here", 1));
        assert!(table_rows("just text").is_empty());
        assert_eq!(first_table_index(""), None);
    }
}
