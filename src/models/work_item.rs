//! 工作项模型
//!
//! 一个 WorkItem 对应一行输入，即一个待处理的 MAWB

use phf::phf_set;
use serde::{Deserialize, Serialize};

/// 已知的机场/站点代码
///
/// 输入行里机场代码不在这个集合里的会被拒绝
static STATION_CODES: phf::Set<&'static str> = phf_set! {
    // 美国主要口岸
    "JFK", "LAX", "ORD", "MIA", "DFW", "ATL", "SFO", "SEA", "EWR", "BOS",
    "IAH", "IAD", "CVG", "ANC", "HNL", "CLT", "DTW", "MSP", "PHL", "PDX",
    "SDF", "MEM", "RFD", "ONT", "OAK", "AFW", "LRD", "ELP", "SAN", "BFI",
    // 亚太出发站
    "PVG", "CAN", "SZX", "HKG", "TPE", "ICN", "NRT", "KIX", "SIN", "BKK",
    "HGH", "CGO", "XMN", "CTU", "WUH", "HYJ", "MFM", "CRK", "HAN", "SGN",
};

/// 工作项
///
/// 由 Input Parser 从一行输入创建，创建后不可变，
/// 被且只被一个 ProcessingJob 消费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// broker 代码（必须在配置的 broker 表里）
    pub broker_code: String,
    /// 机场代码
    pub airport_code: String,
    /// 服务类型（如 M3）
    pub service_type: String,
    /// 航班参考号 / checkbook 号
    pub flight_reference: String,
    /// MAWB，已规范化为 11 位纯数字
    pub mawb: String,
    /// 原始输入行（用于诊断）
    pub raw_line: String,
    /// 输入行号（从 1 开始）
    pub line_no: usize,
}

impl WorkItem {
    /// MAWB 的显示格式：xxx-xxxxxxxx
    pub fn mawb_display(&self) -> String {
        format_mawb(&self.mawb)
    }
}

/// 规范化 MAWB
///
/// 允许最多一个格式分隔符 "-"，去掉后必须正好是 11 位数字。
/// "160-05034083" → "16005034083"；"1234" → None
pub fn normalize_mawb(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.matches('-').count() > 1 {
        return None;
    }
    let digits: String = trimmed.chars().filter(|c| *c != '-').collect();
    if digits.len() == 11 && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

/// 把 11 位 MAWB 格式化为 xxx-xxxxxxxx
pub fn format_mawb(mawb: &str) -> String {
    if mawb.len() == 11 {
        format!("{}-{}", &mawb[..3], &mawb[3..])
    } else {
        mawb.to_string()
    }
}

/// 检查机场代码是否已知
pub fn is_known_station(code: &str) -> bool {
    STATION_CODES.contains(code)
}
