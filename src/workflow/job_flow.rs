//! 任务处理流程 - 流程层
//!
//! 核心职责：定义"一个 MAWB"的完整处理流程
//!
//! 流程顺序：
//! 1. 取会话（缓存 → 探测 → 必要时重新登录）
//! 2. 按规范顺序逐个抓 section（单个失败不中止任务）
//! 3. 组装报告 → 上传产物 → 持久化结果
//!
//! 取消只在步骤边界生效，已挂起的操作不会被打断

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{
    ArtifactKind, ArtifactRef, DutyRecord, FailureKind, JobState, ProcessingJob, Section,
};
use crate::services::extractor::{Credentials, LoginError, SectionError, UploadError};
use crate::services::{report, ArtifactStore, ResultStore, SectionExtractor};
use crate::session::{BrokerLocks, SessionStore};
use crate::utils::logging::truncate_text;
use crate::utils::{CancelFlag, RetryPolicy};
use crate::workflow::job_ctx::JobCtx;

/// 任务处理流程
///
/// - 编排单个任务从取会话到持久化的全过程
/// - 不持有浏览器资源，只依赖能力（services）
/// - 同一实例被所有并发任务共享
pub struct JobFlow {
    extractor: Arc<dyn SectionExtractor>,
    session_store: Arc<SessionStore>,
    broker_locks: Arc<BrokerLocks>,
    artifact_store: Arc<dyn ArtifactStore>,
    result_store: Arc<dyn ResultStore>,
    /// broker 代码 -> 凭据
    credentials: BTreeMap<String, Credentials>,
    login_policy: RetryPolicy,
    section_policy: RetryPolicy,
    /// 单次挂起操作的超时
    op_timeout: Duration,
    /// Document section 的专用超时（批量 PDF 生成很慢）
    document_timeout: Duration,
    /// 报告落地目录
    report_dir: PathBuf,
}

impl JobFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: Arc<dyn SectionExtractor>,
        session_store: Arc<SessionStore>,
        broker_locks: Arc<BrokerLocks>,
        artifact_store: Arc<dyn ArtifactStore>,
        result_store: Arc<dyn ResultStore>,
        credentials: BTreeMap<String, Credentials>,
        login_policy: RetryPolicy,
        section_policy: RetryPolicy,
        op_timeout: Duration,
        document_timeout: Duration,
        report_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            session_store,
            broker_locks,
            artifact_store,
            result_store,
            credentials,
            login_policy,
            section_policy,
            op_timeout,
            document_timeout,
            report_dir,
        }
    }

    /// 跑完一个任务
    ///
    /// 任务结束时一定处于终态，且结果记录已尽力持久化。
    /// 返回 Err 只代表"结果没能写进存储"（任务标记为持久化失败）
    pub async fn run(&self, job: &mut ProcessingJob, cancel: &CancelFlag) -> Result<(), String> {
        let ctx = JobCtx::new(
            job.job_index,
            job.work_item.mawb_display(),
            job.work_item.broker_code.clone(),
        );

        // ========== 步骤 1: 取会话 ==========
        if cancel.is_cancelled() {
            return self.finish_cancelled(job, &ctx).await;
        }

        let state_blob = match self.acquire_session(job, &ctx).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!("[任务 {}] ❌ 登录失败，任务终止: {}", ctx.job_index, e);
                job.error = Some(format!("登录失败: {}", e));
                job.skip_remaining_sections();
                job.advance(JobState::Failed(FailureKind::Login));
                self.persist_best_effort(job, &ctx).await;
                return Ok(());
            }
        };
        job.advance(JobState::SessionReady);

        // ========== 步骤 2: 逐个 section ==========
        for section in job.selected_sections.clone() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(job, &ctx).await;
            }
            job.advance(JobState::SectionPending(section));
            info!(
                "[任务 {}] 🔍 抓取 {} section...",
                ctx.job_index,
                section.name()
            );

            match self.extract_section(job, &state_blob, section).await {
                Ok(data) => {
                    info!(
                        "[任务 {}] ✓ {} section 完成",
                        ctx.job_index,
                        section.name()
                    );
                    job.record_section_success(section, data);
                    // master 不存在时后面的 section 没有意义
                    if job.summary.get("Master Status").map(String::as_str) == Some("Not Found") {
                        warn!(
                            "[任务 {}] ⚠️ master 不存在，跳过剩余 section",
                            ctx.job_index
                        );
                        job.skip_remaining_sections();
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        "[任务 {}] ⚠️ {} section 失败（继续其他 section）: {}",
                        ctx.job_index,
                        section.name(),
                        truncate_text(&e.to_string(), 200)
                    );
                    job.record_section_failure(section, e.to_string());
                }
            }
        }

        // ========== 步骤 3: 组装 / 上传 / 持久化 ==========
        if cancel.is_cancelled() {
            return self.finish_cancelled(job, &ctx).await;
        }
        job.advance(JobState::Assembling);
        if job.has_summary_data() {
            match report::write_report(&self.report_dir, job).await {
                Ok(path) => job
                    .artifacts
                    .push(ArtifactRef::new(ArtifactKind::Report, path)),
                Err(e) => warn!("[任务 {}] ⚠️ 报告生成失败: {}", ctx.job_index, e),
            }
        }

        job.advance(JobState::Uploading);
        self.upload_artifacts(job, &ctx).await;

        job.advance(JobState::Persisting);
        let mut record = DutyRecord::from_job(job, &self.format_for(&ctx.broker_code));
        // 记录先写、状态后推进：写成功了任务才算 completed
        record.status = "completed".to_string();
        match self.persist_with_timeout(&record).await {
            Ok(()) => {
                job.advance(JobState::Completed);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "[任务 {}] ❌ 结果持久化失败（不自动重试，可重新提交）: {}",
                    ctx.job_index, e
                );
                job.error = Some(format!("持久化失败: {}", e));
                job.advance(JobState::Failed(FailureKind::Persist));
                Err(e)
            }
        }
    }

    // ========== 会话 ==========

    /// 取一个可用的 broker 会话
    ///
    /// 同一 broker 的 读取/探测/登录/保存 全程持锁，
    /// 并发任务不会对同一 broker 重复登录
    async fn acquire_session(
        &self,
        job: &ProcessingJob,
        ctx: &JobCtx,
    ) -> Result<JsonValue, LoginError> {
        let broker = &job.work_item.broker_code;
        let _guard = self.broker_locks.acquire(broker).await;

        if let Ok(Some(session)) = self.session_store.load(broker).await {
            // 探测同样受操作超时约束：挂死的探测不能拖住同 broker 的队列
            let probe = tokio::time::timeout(
                self.op_timeout,
                self.extractor.probe(&session.state_blob),
            )
            .await;
            if matches!(probe, Ok(true)) {
                info!(
                    "[任务 {}] ✓ 复用 broker {} 的缓存会话",
                    ctx.job_index, broker
                );
                return Ok(session.state_blob);
            }
            info!(
                "[任务 {}] broker {} 的缓存会话已失效，重新登录",
                ctx.job_index, broker
            );
        }

        let credentials = self.credentials.get(broker).ok_or_else(|| {
            LoginError::Interaction(format!("broker {} 没有配置凭据", broker))
        })?;

        let op_timeout = self.op_timeout;
        let blob = self
            .login_policy
            .run("登录", |_| {}, || {
                let extractor = Arc::clone(&self.extractor);
                let broker = broker.clone();
                let credentials = credentials.clone();
                async move {
                    match tokio::time::timeout(
                        op_timeout,
                        extractor.login(&broker, &credentials),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(LoginError::Timeout),
                    }
                }
            })
            .await?;

        // 保存失败不影响本任务，下个任务会重新登录
        if let Err(e) = self.session_store.save(broker, blob.clone()).await {
            warn!(
                "[任务 {}] ⚠️ 保存 broker {} 会话失败: {}",
                ctx.job_index, broker, e
            );
        }
        Ok(blob)
    }

    // ========== section ==========

    async fn extract_section(
        &self,
        job: &mut ProcessingJob,
        state_blob: &JsonValue,
        section: Section,
    ) -> Result<crate::models::SectionData, SectionError> {
        let item = job.work_item.clone();
        // 批量 PDF 生成远慢于普通抓取，用放宽的专用超时
        let op_timeout = if section == Section::Document {
            self.document_timeout
        } else {
            self.op_timeout
        };
        self.section_policy
            .run(
                section.name(),
                |_| job.record_attempt(section),
                || {
                    let extractor = Arc::clone(&self.extractor);
                    let blob = state_blob.clone();
                    let item = item.clone();
                    async move {
                        match tokio::time::timeout(
                            op_timeout,
                            extractor.extract(&blob, section, &item),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(SectionError::Timeout {
                                section: section.name(),
                            }),
                        }
                    }
                },
            )
            .await
    }

    // ========== 上传 ==========

    /// 上传全部产物
    ///
    /// 上传成功或彻底失败后本地文件都会删除；
    /// 上传失败不影响任务完成，记录里对应产物 URL 为 null
    async fn upload_artifacts(&self, job: &mut ProcessingJob, ctx: &JobCtx) {
        let mawb = job.work_item.mawb.clone();
        for artifact in &mut job.artifacts {
            let Some(local_path) = artifact.local_path.clone() else {
                continue;
            };
            let remote_name = match artifact.kind {
                ArtifactKind::Report => format!("reports/{}", report::report_file_name(&job.work_item)),
                ArtifactKind::Document => format!("documents/{}_7501_batch.pdf", mawb),
            };
            info!(
                "[任务 {}] 📤 上传 {} -> {}",
                ctx.job_index,
                artifact.kind.name(),
                remote_name
            );

            let mut attempt = 0u32;
            let result = loop {
                attempt += 1;
                match self.artifact_store.upload(&local_path, &remote_name).await {
                    Ok(url) => break Ok(url),
                    // 存储端拒绝是永久失败，重试没有意义
                    Err(e @ UploadError::Rejected { .. }) => break Err(e),
                    Err(e) if attempt < self.section_policy.max_attempts => {
                        warn!(
                            "[任务 {}] ⚠️ 上传失败 ({}/{}): {}",
                            ctx.job_index, attempt, self.section_policy.max_attempts, e
                        );
                        tokio::time::sleep(self.section_policy.backoff(attempt)).await;
                    }
                    Err(e) => break Err(e),
                }
            };

            match result {
                Ok(url) => {
                    if artifact.kind == ArtifactKind::Document {
                        job.summary
                            .insert("7501 Batch PDF URL".to_string(), url.clone());
                    }
                    artifact.remote_url = Some(url);
                }
                Err(e) => {
                    warn!(
                        "[任务 {}] ⚠️ {} 上传最终失败，记录里 URL 置空: {}",
                        ctx.job_index,
                        artifact.kind.name(),
                        e
                    );
                }
            }

            // 无论成败，本地文件都不留
            if let Err(e) = tokio::fs::remove_file(&local_path).await {
                warn!(
                    "[任务 {}] 🗑️ 删除本地产物失败: {} ({})",
                    ctx.job_index,
                    local_path.display(),
                    e
                );
            }
            artifact.local_path = None;
        }
    }

    // ========== 持久化 ==========

    async fn persist_with_timeout(&self, record: &DutyRecord) -> Result<(), String> {
        match tokio::time::timeout(self.op_timeout, self.result_store.persist(record)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("持久化超时".to_string()),
        }
    }

    /// 取消/登录失败路径也尽力留一条记录
    async fn persist_best_effort(&self, job: &ProcessingJob, ctx: &JobCtx) {
        let record = DutyRecord::from_job(job, &self.format_for(&ctx.broker_code));
        if let Err(e) = self.persist_with_timeout(&record).await {
            warn!(
                "[任务 {}] ⚠️ 终态记录持久化失败: {}",
                ctx.job_index, e
            );
        }
    }

    async fn finish_cancelled(
        &self,
        job: &mut ProcessingJob,
        ctx: &JobCtx,
    ) -> Result<(), String> {
        info!("[任务 {}] 🛑 任务在步骤边界被取消", ctx.job_index);
        job.error = Some("任务被取消".to_string());
        job.skip_remaining_sections();
        job.advance(JobState::Failed(FailureKind::Cancelled));
        self.persist_best_effort(job, ctx).await;
        Ok(())
    }

    fn format_for(&self, broker_code: &str) -> String {
        self.credentials
            .get(broker_code)
            .map(|c| c.entries_format.clone())
            .unwrap_or_else(|| "allied".to_string())
    }
}
