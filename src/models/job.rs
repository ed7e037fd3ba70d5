//! 处理任务模型
//!
//! 一个 ProcessingJob 跟踪一个 MAWB 走完整个管线的状态。
//! 状态只由编排层（workflow/orchestrator）推进，且单调向前：
//! 同一个任务不会回到更早的状态

use crate::models::section::{Section, SectionData, SectionOutcome};
use crate::models::work_item::WorkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// 任务状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    /// 已拿到有效的 broker 会话
    SessionReady,
    /// 正在处理某个 section
    SectionPending(Section),
    /// 所有 section 都有了终态，正在组装结果
    Assembling,
    Uploading,
    Persisting,
    Completed,
    Failed(FailureKind),
}

impl JobState {
    /// 状态的单调序号；advance 只允许序号不减
    fn rank(self) -> usize {
        match self {
            JobState::Queued => 0,
            JobState::SessionReady => 1,
            JobState::SectionPending(s) => 2 + s.rank(),
            JobState::Assembling => 6,
            JobState::Uploading => 7,
            JobState::Persisting => 8,
            JobState::Completed => 9,
            JobState::Failed(_) => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }
}

/// 任务级失败种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 登录重试耗尽
    Login,
    /// 结果持久化失败（不自动重试，重新提交即可恢复）
    Persist,
    /// 协作式取消
    Cancelled,
}

/// 产物种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// 汇总报表（CSV）
    Report,
    /// 7501 批量 PDF
    Document,
}

impl ArtifactKind {
    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::Report => "report",
            ArtifactKind::Document => "document",
        }
    }
}

/// 一个生成的文件
///
/// 上传成功或彻底失败后 `local_path` 必须被清空，
/// 本地文件同时删除
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub local_path: Option<PathBuf>,
    pub remote_url: Option<String>,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, local_path: PathBuf) -> Self {
        Self {
            kind,
            local_path: Some(local_path),
            remote_url: None,
        }
    }
}

/// 处理任务
///
/// 由一个 WorkItem 创建，只被编排层修改，
/// 到达 Completed 或 Failed 后不再变化
#[derive(Debug)]
pub struct ProcessingJob {
    /// 任务编号（从 1 开始，仅用于日志）
    pub job_index: usize,
    pub work_item: WorkItem,
    /// 非空，已按规范顺序排好
    pub selected_sections: Vec<Section>,
    state: JobState,
    pub attempts_per_section: BTreeMap<Section, u32>,
    pub section_outcomes: BTreeMap<Section, SectionOutcome>,
    /// 各 section 抓到的汇总字段，按抓取顺序合并
    pub summary: BTreeMap<String, String>,
    pub artifacts: Vec<ArtifactRef>,
    /// 最后一个致命错误
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    /// 创建新任务
    ///
    /// `selected` 为空时默认处理全部 section（selected_sections 必须非空）
    pub fn new(job_index: usize, work_item: WorkItem, selected: &[Section]) -> Self {
        let sections = if selected.is_empty() {
            Section::CANONICAL_ORDER.to_vec()
        } else {
            Section::canonicalize(selected)
        };
        Self {
            job_index,
            work_item,
            selected_sections: sections,
            state: JobState::Queued,
            attempts_per_section: BTreeMap::new(),
            section_outcomes: BTreeMap::new(),
            summary: BTreeMap::new(),
            artifacts: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// 推进状态机
    ///
    /// 状态单调向前；试图回退是编排层的 bug，这里拒绝并告警
    pub fn advance(&mut self, next: JobState) {
        if self.state.is_terminal() && next != self.state {
            warn!(
                "[任务 {}] 已是终态 {:?}，忽略状态变更 {:?}",
                self.job_index, self.state, next
            );
            return;
        }
        if next.rank() < self.state.rank() {
            warn!(
                "[任务 {}] 拒绝状态回退: {:?} -> {:?}",
                self.job_index, self.state, next
            );
            debug_assert!(false, "状态机不允许回退");
            return;
        }
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// 记录一次 section 尝试
    pub fn record_attempt(&mut self, section: Section) {
        *self.attempts_per_section.entry(section).or_insert(0) += 1;
    }

    /// 记录 section 成功，合并它抓到的字段
    pub fn record_section_success(&mut self, section: Section, data: SectionData) {
        for (k, v) in data.fields {
            self.summary.insert(k, v);
        }
        if let Some(path) = data.document_path {
            self.artifacts
                .push(ArtifactRef::new(ArtifactKind::Document, path));
        }
        self.section_outcomes.insert(section, SectionOutcome::Succeeded);
    }

    /// 记录 section 失败（不中止任务）
    pub fn record_section_failure(&mut self, section: Section, reason: String) {
        self.section_outcomes
            .insert(section, SectionOutcome::Failed { reason });
    }

    /// 把所有还没有终态的 section 标记为 skipped（取消/登录失败路径）
    pub fn skip_remaining_sections(&mut self) {
        for section in self.selected_sections.clone() {
            self.section_outcomes
                .entry(section)
                .or_insert(SectionOutcome::Skipped);
        }
    }

    /// 成功的 section 数量
    pub fn succeeded_count(&self) -> usize {
        self.section_outcomes
            .values()
            .filter(|o| o.is_success())
            .count()
    }

    /// 是否有任何数据类 section（非 Document）成功
    pub fn has_summary_data(&self) -> bool {
        self.section_outcomes
            .iter()
            .any(|(s, o)| *s != Section::Document && o.is_success())
    }

    /// 持久化记录里的任务级状态
    pub fn status_str(&self) -> &'static str {
        match self.state {
            JobState::Completed => "completed",
            JobState::Failed(FailureKind::Cancelled) => "cancelled",
            JobState::Failed(_) => "failed",
            _ => "running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem {
            broker_code: "HYX".into(),
            airport_code: "JFK".into(),
            service_type: "M3".into(),
            flight_reference: "3391".into(),
            mawb: "16005034083".into(),
            raw_line: "HYX JFK M3 3391 160-05034083".into(),
            line_no: 1,
        }
    }

    #[test]
    fn empty_selection_defaults_to_all_sections() {
        let job = ProcessingJob::new(1, item(), &[]);
        assert_eq!(job.selected_sections, Section::CANONICAL_ORDER.to_vec());
    }

    #[test]
    fn sections_are_canonicalized() {
        let job = ProcessingJob::new(1, item(), &[Section::Document, Section::Summary]);
        assert_eq!(
            job.selected_sections,
            vec![Section::Summary, Section::Document]
        );
    }

    #[test]
    fn advance_is_monotonic() {
        let mut job = ProcessingJob::new(1, item(), &[]);
        job.advance(JobState::SessionReady);
        job.advance(JobState::SectionPending(Section::Entries));
        // 回退被拒绝，状态保持不变
        let before = job.state();
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            job.advance(JobState::Queued);
        }))
        .ok();
        assert_eq!(job.state(), before);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut job = ProcessingJob::new(1, item(), &[]);
        job.advance(JobState::Failed(FailureKind::Login));
        job.advance(JobState::Completed);
        assert_eq!(job.state(), JobState::Failed(FailureKind::Login));
        assert_eq!(job.status_str(), "failed");
    }

    #[test]
    fn cancelled_status_string() {
        let mut job = ProcessingJob::new(1, item(), &[]);
        job.advance(JobState::Failed(FailureKind::Cancelled));
        assert_eq!(job.status_str(), "cancelled");
    }
}
