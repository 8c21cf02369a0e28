//! Generic feature and quality descriptors that are never entities.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Lowercased terms rejected outright.
pub const GENERIC_TERMS: &[&str] = &[
    // English category and quality words
    "suv", "sedan", "mpv", "hatchback", "truck", "ev", "phev", "hybrid", "electric", "pro", "plus",
    "max", "ultra", "mini", "best", "top", "better", "good", "great", "quality", "price", "value",
    "performance", "design", "battery", "range", "comfort", "safety", "space", "interior",
    "exterior", "brand", "brands", "product", "products", "model", "models", "series", "version",
    "review", "reviews", "car", "cars", "phone", "phones", "overall", "summary", "conclusion",
    "features", "pros", "cons", "note", "tips", "recommendation", "recommendations", "option",
    "options", "budget", "premium", "luxury", "the", "and", "for", "with", "ai", "vr", "ar", "usb",
    // CJK category and quality words
    "续航", "性价比", "品牌", "产品", "车型", "推荐", "空间", "动力", "油耗", "配置", "价格", "安全",
    "舒适", "外观", "内饰", "智能", "新能源", "电动车", "汽车", "手机", "优点", "缺点", "总结", "以下",
    "选择", "适合", "家用", "性能", "质量", "设计", "技术", "功能", "系统", "服务", "口碑", "销量",
    "保值", "操控", "品质", "颜值", "亮点", "建议", "注意", "综合", "对比", "排名", "参考",
];

/// Descriptor shapes ("超长续航", "高性价比", "舒适性", "very reliable").
static DESCRIPTOR_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(?:超|高|低|长|大|强|好|优|省){1,2}(?:续航|性价比|空间|品质|颜值|动力|油耗|配置|效率|安全|保值)$",
        r"^[\x{4e00}-\x{9fff}]{1,3}(?:性|度|感)$",
        r"(?i)^(?:very|more|most|highly|extremely|super)\s+\w+$",
        r"(?i)^(?:best|top|great|good|excellent|affordable|reliable)(?:\s+\w+)?$",
        r"^\d+(?:[.,]\d+)?\s*(?:%|万|元|km|公里|kwh|kWh|小时|年)?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Rejects generic terms and descriptor phrases.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    extra: HashSet<String>,
}

impl Blacklist {
    /// Built-in terms plus `extra` (compared case-insensitively).
    pub fn new(extra: &[String]) -> Self {
        Self {
            extra: extra.iter().map(|t| t.trim().to_lowercase()).collect(),
        }
    }

    pub fn is_generic_term(&self, name: &str) -> bool {
        let lower = name.trim().to_lowercase();
        GENERIC_TERMS.contains(&lower.as_str()) || self.extra.contains(&lower)
    }

    pub fn is_descriptor(&self, name: &str) -> bool {
        let trimmed = name.trim();
        DESCRIPTOR_RES.iter().any(|re| re.is_match(trimmed))
    }

    /// True when `name` must not become a candidate.
    pub fn is_blocked(&self, name: &str) -> bool {
        self.is_generic_term(name) || self.is_descriptor(name)
    }
}
