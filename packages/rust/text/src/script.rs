//! Traditional → simplified character pairs.
//!
//! Covers characters common in brand, product and comparison vocabulary.
//! No right-hand character appears on the left, so conversion is idempotent.

pub(crate) const TRADITIONAL_TO_SIMPLIFIED: &[(char, char)] = &[
    ('眾', '众'),
    ('車', '车'),
    ('豐', '丰'),
    ('亞', '亚'),
    ('馬', '马'),
    ('寶', '宝'),
    ('賓', '宾'),
    ('達', '达'),
    ('騰', '腾'),
    ('華', '华'),
    ('為', '为'),
    ('東', '东'),
    ('風', '风'),
    ('長', '长'),
    ('極', '极'),
    ('領', '领'),
    ('紅', '红'),
    ('歐', '欧'),
    ('萊', '莱'),
    ('愛', '爱'),
    ('國', '国'),
    ('廣', '广'),
    ('門', '门'),
    ('電', '电'),
    ('動', '动'),
    ('體', '体'),
    ('機', '机'),
    ('場', '场'),
    ('實', '实'),
    ('樂', '乐'),
    ('點', '点'),
    ('發', '发'),
    ('開', '开'),
    ('關', '关'),
    ('後', '后'),
    ('時', '时'),
    ('間', '间'),
    ('鐘', '钟'),
    ('錶', '表'),
    ('號', '号'),
    ('們', '们'),
    ('來', '来'),
    ('這', '这'),
    ('個', '个'),
    ('會', '会'),
    ('產', '产'),
    ('業', '业'),
    ('價', '价'),
    ('質', '质'),
    ('龍', '龙'),
    ('鳳', '凤'),
    ('雲', '云'),
    ('閃', '闪'),
    ('蘋', '苹'),
    ('訊', '讯'),
    ('網', '网'),
    ('聯', '联'),
    ('雙', '双'),
    ('與', '与'),
    ('對', '对'),
    ('興', '兴'),
    ('傳', '传'),
    ('億', '亿'),
    ('萬', '万'),
    ('銳', '锐'),
    ('觀', '观'),
    ('蘭', '兰'),
    ('鋒', '锋'),
    ('傑', '杰'),
    ('韓', '韩'),
    ('現', '现'),
    ('類', '类'),
    ('試', '试'),
    ('說', '说'),
    ('進', '进'),
    ('還', '还'),
    ('運', '运'),
    ('選', '选'),
    ('輛', '辆'),
    ('輕', '轻'),
    ('駕', '驾'),
    ('駛', '驶'),
    ('錢', '钱'),
    ('銷', '销'),
    ('線', '线'),
    ('級', '级'),
    ('標', '标'),
    ('準', '准'),
    ('優', '优'),
    ('勢', '势'),
    ('續', '续'),
    ('經', '经'),
    ('濟', '济'),
    ('節', '节'),
    ('環', '环'),
    ('適', '适'),
    ('靜', '静'),
    ('響', '响'),
    ('凱', '凯'),
    ('羅', '罗'),
    ('爾', '尔'),
    ('奧', '奥'),
    ('寧', '宁'),
    ('魯', '鲁'),
    ('鈴', '铃'),
    ('納', '纳'),
    ('維', '维'),
    ('麥', '麦'),
    ('尋', '寻'),
    ('遠', '远'),
    ('無', '无'),
    ('戰', '战'),
    ('勝', '胜'),
    ('檔', '档'),
    ('載', '载'),
    ('驅', '驱'),
    ('衛', '卫'),
    ('潔', '洁'),
    ('膚', '肤'),
    ('護', '护'),
    ('裝', '装'),
];
