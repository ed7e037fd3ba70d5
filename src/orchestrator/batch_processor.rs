//! 批量任务处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量任务的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动浏览器、装配会话存储和各能力实现
//! 2. **并发控制**：使用 Semaphore 限制并发数量
//! 3. **分批处理**：任务分批次处理，每批完成后再开始下一批
//! 4. **取消传播**：把取消标志发给每个任务，只在边界生效
//! 5. **资源管理**：持有 Browser，确保生命周期正确
//! 6. **全局统计**：汇总所有任务的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个任务的细节
//! - **资源所有者**：唯一持有 Browser 的模块
//! - **向下委托**：委托 job_processor 处理单个任务

use crate::browser;
use crate::config::Config;
use crate::models::{ProcessingJob, Section, WorkItem};
use crate::orchestrator::job_processor::{self, JobOutcome};
use crate::services::{
    Credentials, NetChbPortal, RestArtifactStore, RestResultStore, SectionExtractor,
};
use crate::session::{BrokerLocks, SessionStore};
use crate::utils::{CancelFlag, RetryPolicy};
use crate::workflow::JobFlow;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
///
/// Browser 由 NetChbPortal 持有（它是唯一用页面的地方）
pub struct App {
    config: Config,
    flow: Arc<JobFlow>,
}

impl App {
    /// 初始化应用：启动浏览器并装配全部能力
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let (browser, page) = match config.browser_debug_port {
            Some(port) => browser::connect_to_browser(port).await?,
            None => browser::launch_browser(config.headless).await?,
        };
        // 初始页面只用于预热，之后每个操作自建页面
        drop(page);

        let formats: BTreeMap<String, String> = config
            .brokers
            .iter()
            .map(|(code, b)| (code.clone(), b.entries_format.clone()))
            .collect();
        let credentials: BTreeMap<String, Credentials> = config
            .brokers
            .iter()
            .map(|(code, b)| {
                (
                    code.clone(),
                    Credentials {
                        username: b.username.clone(),
                        password: b.password.clone(),
                        entries_format: b.entries_format.clone(),
                    },
                )
            })
            .collect();

        let portal = NetChbPortal::new(
            browser,
            PathBuf::from(&config.download_dir),
            Duration::from_secs(config.operation_timeout_secs),
            formats,
        )
        .map_err(|e| anyhow::anyhow!(e))?;
        let extractor: Arc<dyn SectionExtractor> = Arc::new(portal);

        let session_store = Arc::new(SessionStore::new(config.sessions_dir.clone()).await?);
        let broker_locks = Arc::new(BrokerLocks::new());
        let artifact_store = Arc::new(
            RestArtifactStore::new(
                &config.storage_url,
                &config.storage_bucket,
                &config.identity_service_key,
            )
            .map_err(|e| anyhow::anyhow!(e))?,
        );
        let result_store = Arc::new(
            RestResultStore::new(&config.storage_url, &config.identity_service_key)
                .map_err(|e| anyhow::anyhow!(e))?,
        );

        let flow = Arc::new(JobFlow::new(
            extractor,
            session_store,
            broker_locks,
            artifact_store,
            result_store,
            credentials,
            RetryPolicy::new(
                config.login_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            RetryPolicy::new(
                config.section_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            Duration::from_secs(config.operation_timeout_secs),
            Duration::from_secs(config.document_timeout_secs),
            PathBuf::from(&config.download_dir),
        ));

        Ok(Self { config, flow })
    }

    /// 运行批量处理
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        sections: &[Section],
        cancel: CancelFlag,
    ) -> Result<ProcessingStats> {
        if items.is_empty() {
            warn!("⚠️ 没有可处理的工作项，程序结束");
            return Ok(ProcessingStats::default());
        }

        let total_jobs = items.len();
        log_jobs_loaded(total_jobs, self.config.max_concurrent_jobs);

        let stats = self.process_all_jobs(items, sections, cancel).await?;
        print_final_stats(&stats);
        Ok(stats)
    }

    /// 处理所有任务
    async fn process_all_jobs(
        &self,
        items: Vec<WorkItem>,
        sections: &[Section],
        cancel: CancelFlag,
    ) -> Result<ProcessingStats> {
        let max_concurrent = self.config.max_concurrent_jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let total_jobs = items.len();
        let mut stats = ProcessingStats {
            total: total_jobs,
            ..Default::default()
        };

        // 分批处理
        for batch_start in (0..total_jobs).step_by(max_concurrent) {
            let batch_end = (batch_start + max_concurrent).min(total_jobs);
            let batch_items = &items[batch_start..batch_end];
            let batch_num = (batch_start / max_concurrent) + 1;
            let total_batches = (total_jobs + max_concurrent - 1) / max_concurrent;

            log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_end,
                total_jobs,
            );

            let batch_result = self
                .process_batch(batch_items, batch_start, sections, semaphore.clone(), &cancel)
                .await?;

            stats.completed += batch_result.completed;
            stats.failed += batch_result.failed;
            stats.cancelled += batch_result.cancelled;

            log_batch_complete(batch_num, &batch_result);
        }

        Ok(stats)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch_items: &[WorkItem],
        batch_start: usize,
        sections: &[Section],
        semaphore: Arc<Semaphore>,
        cancel: &CancelFlag,
    ) -> Result<BatchResult> {
        let mut batch_handles = Vec::new();

        for (idx, item) in batch_items.iter().enumerate() {
            let job_index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;

            let job = ProcessingJob::new(job_index, item.clone(), sections);
            let flow = Arc::clone(&self.flow);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                job_processor::process_job(flow, job, cancel).await
            });
            batch_handles.push((job_index, handle));
        }

        // 等待本批所有任务完成
        let mut result = BatchResult::default();
        for (job_index, handle) in batch_handles {
            match handle.await {
                Ok(JobOutcome::Completed) => result.completed += 1,
                Ok(JobOutcome::Failed) => result.failed += 1,
                Ok(JobOutcome::Cancelled) => result.cancelled += 1,
                Err(e) => {
                    error!("[任务 {}] 任务执行失败: {}", job_index, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }
}

/// 处理统计
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// 批次处理结果
#[derive(Debug, Default)]
struct BatchResult {
    completed: usize,
    failed: usize,
    cancelled: usize,
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - NetCHB 关税批量抓取");
    info!("📊 最大并发数: {}", config.max_concurrent_jobs);
    info!("🏢 已配置 broker: {}", config.broker_codes().join(", "));
    info!("{}", "=".repeat(60));
}

fn log_jobs_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 共 {} 个待处理的 MAWB", total);
    info!("📋 将以每批 {} 个的方式处理", max_concurrent);
    info!("💡 每批完成后再开始下一批\n");
}

fn log_batch_start(batch_num: usize, total_batches: usize, start: usize, end: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批任务: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

fn log_batch_complete(batch_num: usize, result: &BatchResult) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 批完成: 成功 {}, 失败 {}, 取消 {}",
        batch_num, result.completed, result.failed, result.cancelled
    );
    info!("{}", "─".repeat(60));
}

fn print_final_stats(stats: &ProcessingStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", stats.completed, stats.total);
    info!("❌ 失败: {}", stats.failed);
    info!("🛑 取消: {}", stats.cancelled);
    info!("{}", "=".repeat(60));
}
