//! 单个任务处理器 - 编排层
//!
//! 负责一个任务的计时、日志和收尾：
//! 委托 JobFlow 跑流程，结束后确保本地产物不残留

use crate::models::{FailureKind, JobState, ProcessingJob};
use crate::utils::CancelFlag;
use crate::workflow::JobFlow;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 任务结局（给批次统计用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// 处理单个任务
pub async fn process_job(
    flow: Arc<JobFlow>,
    mut job: ProcessingJob,
    cancel: CancelFlag,
) -> JobOutcome {
    let job_index = job.job_index;
    log_job_start(&job);
    let started = std::time::Instant::now();

    if let Err(e) = flow.run(&mut job, &cancel).await {
        error!("[任务 {}] ❌ 结果未能持久化: {}", job_index, e);
    }

    // 兜底清理：任何路径漏掉的本地产物在这里删除
    cleanup_local_artifacts(&mut job).await;

    let outcome = match job.state() {
        JobState::Completed => JobOutcome::Completed,
        JobState::Failed(FailureKind::Cancelled) => JobOutcome::Cancelled,
        _ => JobOutcome::Failed,
    };
    log_job_complete(&job, outcome, started.elapsed());
    outcome
}

async fn cleanup_local_artifacts(job: &mut ProcessingJob) {
    for artifact in &mut job.artifacts {
        let Some(path) = artifact.local_path.take() else {
            continue;
        };
        if !path.exists() {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(
                "[任务 {}] 🗑️ 已清理残留产物: {}",
                job.job_index,
                path.display()
            ),
            Err(e) => warn!(
                "[任务 {}] ⚠️ 清理产物失败: {} ({})",
                job.job_index,
                path.display(),
                e
            ),
        }
    }
}

// ========== 日志辅助函数 ==========

fn log_job_start(job: &ProcessingJob) {
    info!("\n[任务 {}] {}", job.job_index, "─".repeat(30));
    info!(
        "[任务 {}] 开始处理 MAWB {} (broker {}, {} 个 section)",
        job.job_index,
        job.work_item.mawb_display(),
        job.work_item.broker_code,
        job.selected_sections.len()
    );
}

fn log_job_complete(job: &ProcessingJob, outcome: JobOutcome, elapsed: std::time::Duration) {
    let mark = match outcome {
        JobOutcome::Completed => "✅",
        JobOutcome::Cancelled => "🛑",
        JobOutcome::Failed => "❌",
    };
    info!(
        "[任务 {}] {} 结束: section 成功 {}/{}，耗时 {:.1}s",
        job.job_index,
        mark,
        job.succeeded_count(),
        job.selected_sections.len(),
        elapsed.as_secs_f64()
    );
    if let Some(e) = &job.error {
        info!("[任务 {}] 原因: {}", job.job_index, e);
    }
}
