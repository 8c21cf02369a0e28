//! Heuristic brand / product classification.

use std::sync::LazyLock;

use regex::Regex;

use brandlens_shared::EntityType;

use crate::blacklist::Blacklist;

/// Well-known brands across verticals, lowercased.
pub const BRAND_HINTS: &[&str] = &[
    "honda", "本田", "toyota", "丰田", "byd", "比亚迪", "volkswagen", "vw", "大众", "bmw", "宝马",
    "mercedes", "mercedes-benz", "奔驰", "audi", "奥迪", "tesla", "特斯拉", "ford", "福特",
    "chevrolet", "雪佛兰", "nissan", "日产", "hyundai", "现代", "kia", "起亚", "porsche", "保时捷",
    "lexus", "雷克萨斯", "volvo", "沃尔沃", "mazda", "马自达", "subaru", "斯巴鲁", "jeep", "吉普",
    "land rover", "路虎", "jaguar", "捷豹", "ferrari", "法拉利", "lamborghini", "兰博基尼", "理想",
    "li auto", "nio", "蔚来", "xpeng", "小鹏", "geely", "吉利", "changan", "长安", "great wall",
    "长城", "haval", "哈弗", "wey", "魏牌", "zeekr", "极氪", "lynk & co", "领克", "buick", "别克",
    "cadillac", "凯迪拉克", "chery", "奇瑞", "tank", "坦克", "ora", "欧拉", "leapmotor", "零跑",
    "neta", "哪吒", "aito", "问界", "deepal", "深蓝", "avatr", "阿维塔", "mg", "名爵", "roewe",
    "荣威", "baojun", "宝骏", "trumpchi", "传祺", "apple", "苹果", "samsung", "三星", "huawei",
    "华为", "xiaomi", "小米", "oppo", "vivo", "oneplus", "一加", "sony", "索尼", "google", "谷歌",
    "loreal", "欧莱雅", "nike", "耐克", "adidas", "阿迪达斯", "puma", "彪马", "under armour",
    "dyson", "戴森", "shark", "roomba", "irobot",
];

/// Well-known product lines, lowercased.
pub const PRODUCT_HINTS: &[&str] = &[
    "宋", "汉", "唐", "秦", "元", "海豹", "海豚", "camry", "凯美瑞", "corolla", "卡罗拉", "rav4",
    "荣放", "cr-v", "crv", "accord", "雅阁", "civic", "思域", "途观", "帕萨特", "朗逸", "速腾", "迈腾",
    "iphone", "galaxy", "mate", "pixel", "model y", "modely", "model 3", "model3", "ipad",
    "macbook", "airpods",
];

/// Trailing tokens that mark a product line variant.
const PRODUCT_SUFFIXES: &[&str] = &[
    "PLUS", "Plus", "plus", "Pro", "PRO", "pro", "Max", "MAX", "max", "Ultra", "ULTRA", "ultra",
    "Mini", "MINI", "mini", "EV", "ev", "DM", "DM-i", "DM-p", "dm", "dm-i", "dm-p", "GT", "gt", "SE",
    "se", "XL", "xl",
];

/// Upper-case abbreviations that look like brands but are not.
const NON_BRAND_ABBREVIATIONS: &[&str] = &["EV", "DM", "AI", "VR", "AR", "SUV", "MPV", "USB"];

static MODEL_PATTERN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[A-Za-z]+\d+",
        r"\d+[A-Za-z]+",
        r"^[A-Z]\d+$",
        r"(?i)^Model\s?[A-Z0-9]",
        r"^ID\.\d+",
        r"^[A-Z]{1,3}-?[A-Z]?\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static CAPITALIZED_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+$").expect("valid regex"));
static UPPER_ABBREVIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,5}$").expect("valid regex"));
static CJK_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4e00}-\x{9fff}]{2,4}$").expect("valid regex"));

/// Outcome of classifying one surface name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Brand,
    Product,
    Other,
}

impl Classification {
    pub fn entity_type(self) -> Option<EntityType> {
        match self {
            Self::Brand => Some(EntityType::Brand),
            Self::Product => Some(EntityType::Product),
            Self::Other => None,
        }
    }
}

pub fn has_model_pattern(name: &str) -> bool {
    MODEL_PATTERN_RES.iter().any(|re| re.is_match(name))
}

pub fn has_product_suffix(name: &str) -> bool {
    PRODUCT_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix) || name.contains(&format!(" {suffix}")))
}

fn is_hint(hints: &[&str], name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    hints.contains(&lower.as_str())
}

pub fn is_likely_brand(name: &str, blacklist: &Blacklist) -> bool {
    if blacklist.is_blocked(name) || has_model_pattern(name) {
        return false;
    }
    if is_hint(BRAND_HINTS, name) {
        return true;
    }
    if CAPITALIZED_WORD_RE.is_match(name) && name.chars().count() >= 4 {
        return true;
    }
    if CJK_TAIL_RE.is_match(name)
        && !name.chars().any(|c| c.is_ascii_digit())
        && !has_product_suffix(name)
        && !is_hint(PRODUCT_HINTS, name)
    {
        return true;
    }
    UPPER_ABBREVIATION_RE.is_match(name) && !NON_BRAND_ABBREVIATIONS.contains(&name)
}

pub fn is_likely_product(name: &str, blacklist: &Blacklist) -> bool {
    if blacklist.is_generic_term(name) {
        return false;
    }
    has_model_pattern(name) || is_hint(PRODUCT_HINTS, name) || has_product_suffix(name)
}

/// Brand, product or neither. Brand heuristics are checked first.
pub fn classify(name: &str, blacklist: &Blacklist) -> Classification {
    if blacklist.is_generic_term(name) {
        Classification::Other
    } else if is_likely_brand(name, blacklist) {
        Classification::Brand
    } else if is_likely_product(name, blacklist) {
        Classification::Product
    } else {
        Classification::Other
    }
}
