//! Variant signals: the parts of a name that distinguish a model variant
//! from its parent line ("iPhone14" vs "iPhone", "宋PLUS" vs "宋").

use std::collections::BTreeSet;

/// Latin trim, drivetrain and capacity tokens.
const TRIM_TOKENS: &[&str] = &[
    "pro", "plus", "max", "ultra", "mini", "lite", "se", "gt", "xl", "l", "ev", "phev", "hev",
    "bev", "dm", "dmi", "dmp", "hybrid", "long", "range", "performance", "awd", "4wd", "gb", "tb",
    "mah", "inch", "mm", "kwh",
];

/// CJK trim markers, matched by containment.
const CJK_TRIM_TOKENS: &[&str] = &[
    "长续航", "标准版", "高性能", "四驱", "两驱", "旗舰", "尊享", "豪华版", "运动版", "新能源", "混动",
    "纯电", "英寸", "升",
];

/// Trim and capacity words long enough to find inside a run-together
/// residue ("longrange", "promax", "128gb").
const RESIDUE_TRIM_TOKENS: &[&str] = &[
    "pro", "plus", "max", "ultra", "mini", "lite", "long", "range", "performance", "hybrid", "phev",
    "awd", "4wd", "dmi", "dmp", "kwh", "mah", "gb", "tb", "inch",
];

/// Valid tails that keep a multi-token name together (e.g. "Song Plus").
pub const VALID_EXTRA_TERMS: &[&str] = &[
    "hybrid", "ev", "plus", "pro", "max", "ultra", "mini", "dmi", "dm-i", "dmp", "dm-p",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Lower,
    Upper,
    Digit,
    Cjk,
    Other,
}

fn class_of(c: char) -> CharClass {
    if c.is_ascii_digit() {
        CharClass::Digit
    } else if c.is_lowercase() {
        CharClass::Lower
    } else if c.is_uppercase() {
        CharClass::Upper
    } else if is_cjk(c) {
        CharClass::Cjk
    } else if c.is_alphabetic() {
        CharClass::Lower
    } else {
        CharClass::Other
    }
}

/// CJK unified ideographs (basic block and extension A).
pub fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// Split a name into lowercase tokens at script, digit and camel-case boundaries.
///
/// `"ModelYLongRange"` → `model, y, long, range`; `"宋PLUS"` → `宋, plus`.
pub fn tokenize(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev: Option<CharClass> = None;

    for (i, &c) in chars.iter().enumerate() {
        let class = class_of(c);
        if class == CharClass::Other {
            flush(&mut current, &mut tokens);
            prev = None;
            continue;
        }
        let boundary = match (prev, class) {
            (None, _) => false,
            (Some(CharClass::Lower), CharClass::Upper) => true,
            // "YLong": split before the upper that starts a lowercase run
            (Some(CharClass::Upper), CharClass::Upper) => chars
                .get(i + 1)
                .is_some_and(|n| class_of(*n) == CharClass::Lower),
            (Some(CharClass::Upper), CharClass::Lower) | (Some(CharClass::Lower), CharClass::Lower) => false,
            (Some(p), c) => p != c,
        };
        if boundary {
            flush(&mut current, &mut tokens);
        }
        current.extend(c.to_lowercase());
        prev = Some(class);
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// The variant signals carried by a name: digit runs and trim tokens.
pub fn variant_signals(name: &str) -> BTreeSet<String> {
    let mut signals = BTreeSet::new();
    for token in tokenize(name) {
        if token.chars().all(|c| c.is_ascii_digit()) || TRIM_TOKENS.contains(&token.as_str()) {
            signals.insert(token);
        }
    }
    for trim in CJK_TRIM_TOKENS {
        if name.contains(trim) {
            signals.insert((*trim).to_string());
        }
    }
    signals
}

pub fn has_variant_signals(name: &str) -> bool {
    !variant_signals(name).is_empty()
}

/// True when `candidate` carries a signal that `key` lacks.
///
/// Such a candidate must not be folded into `key`.
pub fn adds_variant_signals(candidate: &str, key: &str) -> bool {
    let key_signals = variant_signals(key);
    variant_signals(candidate)
        .iter()
        .any(|signal| !key_signals.contains(signal))
}

/// True when `residue`, the part of a longer key left after removing a
/// shorter key, names a variant: any digit, a bare trim token, or a trim
/// word anywhere inside it.
///
/// Keys have lost their case and token boundaries, so `"modelylongrange"`
/// minus `"modely"` is scanned as `"longrange"`.
pub fn residue_has_variant_signals(residue: &str) -> bool {
    let residue = residue.to_lowercase();
    if residue.is_empty() {
        return false;
    }
    residue.chars().any(|c| c.is_ascii_digit())
        || TRIM_TOKENS.contains(&residue.as_str())
        || RESIDUE_TRIM_TOKENS.iter().any(|t| residue.contains(t))
        || CJK_TRIM_TOKENS.iter().any(|t| residue.contains(t))
}

/// True when one key strictly contains the other and the leftover text
/// carries variant signals.
pub fn keys_differ_by_variant(a: &str, b: &str) -> bool {
    let (longer, shorter) = if a.chars().count() >= b.chars().count() { (a, b) } else { (b, a) };
    !shorter.is_empty()
        && longer != shorter
        && longer.contains(shorter)
        && residue_has_variant_signals(&longer.replace(shorter, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_camel_case_and_scripts() {
        assert_eq!(tokenize("ModelYLongRange"), ["model", "y", "long", "range"]);
        assert_eq!(tokenize("宋PLUS DM-i"), ["宋", "plus", "dm", "i"]);
        assert_eq!(tokenize("iPhone14"), ["i", "phone", "14"]);
        assert_eq!(tokenize("小米13 Ultra"), ["小米", "13", "ultra"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn detects_variant_signals() {
        assert!(has_variant_signals("iPhone14"));
        assert!(has_variant_signals("宋PLUS"));
        assert!(has_variant_signals("Mate50"));
        assert!(has_variant_signals("ModelYLongRange"));
        assert!(has_variant_signals("汉EV"));
        assert!(has_variant_signals("Galaxy S23"));
        assert!(has_variant_signals("理想L9"));
        assert!(!has_variant_signals("iPhone"));
        assert!(!has_variant_signals("宋"));
        assert!(!has_variant_signals("ModelY"));
        assert!(!has_variant_signals("Volkswagen"));
        assert!(!has_variant_signals("上汽大众"));
    }

    #[test]
    fn compares_signals_between_candidate_and_key() {
        assert!(adds_variant_signals("iPhone14", "iPhone"));
        assert!(adds_variant_signals("iPhone 15 Pro", "iPhone 15"));
        assert!(!adds_variant_signals("iPhone 15", "iPhone15"));
        assert!(!adds_variant_signals("上汽大众", "大众"));
        assert!(!adds_variant_signals("Model Y", "ModelY"));
    }

    #[test]
    fn residues_of_run_together_keys() {
        assert!(residue_has_variant_signals("longrange"));
        assert!(residue_has_variant_signals("promax"));
        assert!(residue_has_variant_signals("128gb"));
        assert!(residue_has_variant_signals("宋plus"));
        assert!(residue_has_variant_signals("ev"));
        assert!(residue_has_variant_signals("长续航"));
        assert!(!residue_has_variant_signals("汽车"));
        assert!(!residue_has_variant_signals("motors"));
        assert!(!residue_has_variant_signals(""));
    }

    #[test]
    fn keys_differing_by_a_variant_residue() {
        assert!(keys_differ_by_variant("modelylongrange", "modely"));
        assert!(keys_differ_by_variant("modely", "modelylongrange"));
        assert!(keys_differ_by_variant("iphonepromax", "iphone"));
        assert!(keys_differ_by_variant("比亚迪宋plus", "比亚迪"));
        assert!(!keys_differ_by_variant("大众汽车", "大众"));
        assert!(!keys_differ_by_variant("modely", "modely"));
        assert!(!keys_differ_by_variant("tesla", "特斯拉"));
    }
}
