//! 持久化的结果记录

use crate::models::job::{ArtifactKind, ProcessingJob};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 记录里的一个产物条目
///
/// 上传失败的产物 `url` 为 null，记录本身照常持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordArtifact {
    pub kind: ArtifactKind,
    pub url: Option<String>,
}

/// 关税结果记录
///
/// 每个任务（成功、失败、取消）都会产生一条记录，
/// 调用方通过 `sections` 和 `artifacts` 判断质量，
/// 而不是只看任务级状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyRecord {
    pub mawb: String,
    pub broker_code: String,
    pub airport_code: String,
    pub flight_reference: String,
    /// broker 的 entries 格式（如 "allied"）
    pub format: String,
    /// 任务级状态: completed | failed | cancelled
    pub status: String,
    /// section 名 → succeeded | failed | skipped
    pub sections: BTreeMap<String, String>,
    pub artifacts: Vec<RecordArtifact>,
    /// 抓到的汇总字段（AMS Duty、Entry Date 等）
    pub summary: BTreeMap<String, String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DutyRecord {
    /// 从终态的任务组装记录
    pub fn from_job(job: &ProcessingJob, format: &str) -> Self {
        let sections = job
            .section_outcomes
            .iter()
            .map(|(s, o)| (s.name().to_string(), o.as_status().to_string()))
            .collect();
        let artifacts = job
            .artifacts
            .iter()
            .map(|a| RecordArtifact {
                kind: a.kind,
                url: a.remote_url.clone(),
            })
            .collect();
        Self {
            mawb: job.work_item.mawb.clone(),
            broker_code: job.work_item.broker_code.clone(),
            airport_code: job.work_item.airport_code.clone(),
            flight_reference: job.work_item.flight_reference.clone(),
            format: format.to_string(),
            status: job.status_str().to_string(),
            sections,
            artifacts,
            summary: job.summary.clone(),
            error_message: job.error.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobState;
    use crate::models::section::{Section, SectionData};
    use crate::models::work_item::WorkItem;

    #[test]
    fn record_reflects_mixed_outcomes() {
        let item = WorkItem {
            broker_code: "HYX".into(),
            airport_code: "JFK".into(),
            service_type: "M3".into(),
            flight_reference: "3391".into(),
            mawb: "16005034083".into(),
            raw_line: String::new(),
            line_no: 1,
        };
        let mut job = ProcessingJob::new(1, item, &[Section::Summary, Section::Entries]);
        job.record_section_success(Section::Summary, SectionData::default());
        job.record_section_failure(Section::Entries, "timeout".into());
        job.advance(JobState::Completed);

        let record = DutyRecord::from_job(&job, "allied");
        assert_eq!(record.status, "completed");
        assert_eq!(record.sections["summary"], "succeeded");
        assert_eq!(record.sections["entries"], "failed");
        assert_eq!(record.format, "allied");
    }
}
