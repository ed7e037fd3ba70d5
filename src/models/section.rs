//! Section 模型
//!
//! 一个 Section 是一类可以独立抓取的关税数据（AMS 汇总、entries、
//! 自定义报表、7501 批量 PDF）。Section 之间互相独立，
//! 单个 Section 失败不会中止整个任务

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Section 种类
///
/// 顺序即固定的处理顺序（后面的 Section 可能依赖前面页面展示的数据），
/// 不要调整变体顺序
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// AMS 汇总（总 HAWB 数、到港日期、AMS duty）
    Summary,
    /// Entries 查询（entry 数量、duty、entry date）
    Entries,
    /// 自定义报表（按 broker 的 entries 格式下载并解析）
    CustomReport,
    /// 7501 批量 PDF 下载
    Document,
}

impl Section {
    /// 固定的规范处理顺序
    pub const CANONICAL_ORDER: [Section; 4] = [
        Section::Summary,
        Section::Entries,
        Section::CustomReport,
        Section::Document,
    ];

    /// 在规范顺序中的位置
    pub fn rank(self) -> usize {
        match self {
            Section::Summary => 0,
            Section::Entries => 1,
            Section::CustomReport => 2,
            Section::Document => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Entries => "entries",
            Section::CustomReport => "custom-report",
            Section::Document => "document",
        }
    }

    /// 按名称解析（命令行的 --sections 用）
    pub fn from_name(name: &str) -> Option<Section> {
        Self::CANONICAL_ORDER
            .iter()
            .copied()
            .find(|s| s.name() == name)
    }

    /// 把任意顺序（可能重复）的选择归一化为规范顺序的去重列表
    pub fn canonicalize(selected: &[Section]) -> Vec<Section> {
        Self::CANONICAL_ORDER
            .iter()
            .copied()
            .filter(|s| selected.contains(s))
            .collect()
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 单个 Section 的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionOutcome {
    Succeeded,
    Failed { reason: String },
    Skipped,
}

impl SectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SectionOutcome::Succeeded)
    }

    /// 持久化记录里用的状态字符串
    pub fn as_status(&self) -> &'static str {
        match self {
            SectionOutcome::Succeeded => "succeeded",
            SectionOutcome::Failed { .. } => "failed",
            SectionOutcome::Skipped => "skipped",
        }
    }
}

/// 一次 Section 抓取得到的数据
///
/// `fields` 是汇总字段（如 "AMS Duty" → "1234.56"），
/// `document_path` 只在 Document section 下载成功时有值
#[derive(Debug, Clone, Default)]
pub struct SectionData {
    pub fields: BTreeMap<String, String>,
    pub document_path: Option<PathBuf>,
}

impl SectionData {
    pub fn with_fields(fields: BTreeMap<String, String>) -> Self {
        Self {
            fields,
            document_path: None,
        }
    }

    pub fn with_document(path: PathBuf) -> Self {
        Self {
            fields: BTreeMap::new(),
            document_path: Some(path),
        }
    }
}
