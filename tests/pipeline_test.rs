//! 任务管线的集成测试
//!
//! 用内存 mock 替换门户/存储能力，验证编排层的关键性质：
//! 单个 section 失败不中止任务、同 broker 登录串行、
//! 取消只在边界生效、上传失败不影响记录持久化

use async_trait::async_trait;
use netchb_duty_runner::models::{
    DutyRecord, FailureKind, JobState, ProcessingJob, Section, SectionData, WorkItem,
};
use netchb_duty_runner::services::extractor::{
    Credentials, DownloadError, LoginError, PersistError, SectionError, SectionExtractor,
    UploadError,
};
use netchb_duty_runner::services::{ArtifactStore, ResultStore};
use netchb_duty_runner::session::{BrokerLocks, SessionStore};
use netchb_duty_runner::utils::{CancelFlag, RetryPolicy};
use netchb_duty_runner::workflow::JobFlow;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ========== mock 能力 ==========

#[derive(Default)]
struct MockExtractor {
    /// 这些 section 永远失败
    fail_sections: HashSet<Section>,
    login_count: AtomicUsize,
    active_logins: AtomicUsize,
    login_overlap: AtomicBool,
    /// Document section 往这里写文件
    download_dir: PathBuf,
    /// 探测前先睡这么久（模拟挂死的探测导航）
    probe_delay: Duration,
    /// Document 抓取前先睡这么久（模拟缓慢的批量 PDF 生成）
    document_delay: Duration,
    /// 抓取过程中置位这个取消标志（模拟处理到一半收到取消）
    cancel_during_extract: Option<CancelFlag>,
}

impl MockExtractor {
    fn new(download_dir: &Path) -> Self {
        Self {
            download_dir: download_dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn failing(download_dir: &Path, sections: &[Section]) -> Self {
        Self {
            fail_sections: sections.iter().copied().collect(),
            download_dir: download_dir.to_path_buf(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SectionExtractor for MockExtractor {
    async fn login(
        &self,
        _broker_code: &str,
        _credentials: &Credentials,
    ) -> Result<JsonValue, LoginError> {
        let active = self.active_logins.fetch_add(1, Ordering::SeqCst) + 1;
        if active > 1 {
            self.login_overlap.store(true, Ordering::SeqCst);
        }
        // 留出足够的窗口暴露并发登录
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active_logins.fetch_sub(1, Ordering::SeqCst);
        self.login_count.fetch_add(1, Ordering::SeqCst);
        Ok(json!([{"name": "JSESSIONID", "value": "mock"}]))
    }

    async fn probe(&self, state_blob: &JsonValue) -> bool {
        if self.probe_delay > Duration::ZERO {
            tokio::time::sleep(self.probe_delay).await;
        }
        state_blob.is_array()
    }

    async fn extract(
        &self,
        _state_blob: &JsonValue,
        section: Section,
        item: &WorkItem,
    ) -> Result<SectionData, SectionError> {
        if let Some(cancel) = &self.cancel_during_extract {
            cancel.cancel();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if self.fail_sections.contains(&section) {
            return Err(SectionError::extraction(section, "mock 注入的失败"));
        }
        if section == Section::Document {
            if self.document_delay > Duration::ZERO {
                tokio::time::sleep(self.document_delay).await;
            }
            let path = self
                .download_dir
                .join(format!("{}_{}.pdf", item.mawb, item.line_no));
            tokio::fs::write(&path, b"%PDF-mock").await.unwrap();
            return Ok(SectionData::with_document(path));
        }
        let mut fields = BTreeMap::new();
        fields.insert(format!("{} ok", section.name()), "1".to_string());
        if section == Section::Summary {
            fields.insert("Master Status".to_string(), "Found".to_string());
        }
        Ok(SectionData::with_fields(fields))
    }

    async fn download_document(
        &self,
        _state_blob: &JsonValue,
        _item: &WorkItem,
    ) -> Result<PathBuf, DownloadError> {
        Err(DownloadError::NotAvailable)
    }
}

/// 上传行为可配置的产物存储
struct MockArtifactStore {
    reject_all: bool,
    uploaded: Mutex<Vec<String>>,
}

impl MockArtifactStore {
    fn accepting() -> Self {
        Self {
            reject_all: false,
            uploaded: Mutex::new(Vec::new()),
        }
    }

    fn rejecting() -> Self {
        Self {
            reject_all: true,
            uploaded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn upload(&self, _local_path: &Path, remote_name: &str) -> Result<String, UploadError> {
        if self.reject_all {
            return Err(UploadError::Rejected { status: 403 });
        }
        self.uploaded.lock().unwrap().push(remote_name.to_string());
        Ok(format!("https://storage.example.com/{}", remote_name))
    }
}

struct MockResultStore {
    records: Mutex<Vec<DutyRecord>>,
    fail: bool,
}

impl MockResultStore {
    fn working() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn persisted(&self) -> Vec<DutyRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultStore for MockResultStore {
    async fn persist(&self, record: &DutyRecord) -> Result<(), PersistError> {
        if self.fail {
            return Err(PersistError::Rejected { status: 500 });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn search(&self, mawb: &str, _limit: usize) -> Result<Vec<DutyRecord>, PersistError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.mawb == mawb)
            .cloned()
            .collect())
    }
}

// ========== 组装 ==========

fn work_item(line_no: usize) -> WorkItem {
    WorkItem {
        broker_code: "HYX".to_string(),
        airport_code: "JFK".to_string(),
        service_type: "M3".to_string(),
        flight_reference: "3391".to_string(),
        mawb: "16005034083".to_string(),
        raw_line: "HYX JFK M3 3391 160-05034083".to_string(),
        line_no,
    }
}

async fn make_flow(
    tmp: &TempDir,
    extractor: Arc<MockExtractor>,
    artifacts: Arc<MockArtifactStore>,
    results: Arc<MockResultStore>,
) -> JobFlow {
    make_flow_with_timeouts(
        tmp,
        extractor,
        artifacts,
        results,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .await
}

async fn make_flow_with_timeouts(
    tmp: &TempDir,
    extractor: Arc<MockExtractor>,
    artifacts: Arc<MockArtifactStore>,
    results: Arc<MockResultStore>,
    op_timeout: Duration,
    document_timeout: Duration,
) -> JobFlow {
    let session_store = Arc::new(
        SessionStore::new(tmp.path().join("sessions"))
            .await
            .unwrap(),
    );
    let mut credentials = BTreeMap::new();
    credentials.insert(
        "HYX".to_string(),
        Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
            entries_format: "allied".to_string(),
        },
    );
    JobFlow::new(
        extractor,
        session_store,
        Arc::new(BrokerLocks::new()),
        artifacts,
        results,
        credentials,
        RetryPolicy::new(2, Duration::from_millis(1)),
        RetryPolicy::new(2, Duration::from_millis(1)),
        op_timeout,
        document_timeout,
        tmp.path().join("artifacts"),
    )
}

// ========== 测试 ==========

#[tokio::test]
async fn single_section_failure_does_not_abort_the_job() {
    let tmp = TempDir::new().unwrap();
    let extractor = Arc::new(MockExtractor::failing(tmp.path(), &[Section::Entries]));
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::accepting()),
        results.clone(),
    )
    .await;

    let mut job = ProcessingJob::new(
        1,
        work_item(1),
        &[Section::Summary, Section::Entries, Section::CustomReport],
    );
    flow.run(&mut job, &CancelFlag::new()).await.unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(job.succeeded_count(), 2);

    let records = results.persisted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "completed");
    assert_eq!(records[0].sections["summary"], "succeeded");
    assert_eq!(records[0].sections["entries"], "failed");
    assert_eq!(records[0].sections["custom-report"], "succeeded");
}

#[tokio::test]
async fn same_broker_jobs_share_one_login() {
    let tmp = TempDir::new().unwrap();
    let extractor = Arc::new(MockExtractor::new(tmp.path()));
    let results = Arc::new(MockResultStore::working());
    let flow = Arc::new(
        make_flow(
            &tmp,
            extractor.clone(),
            Arc::new(MockArtifactStore::accepting()),
            results.clone(),
        )
        .await,
    );

    let mut handles = Vec::new();
    for i in 1..=3 {
        let flow = Arc::clone(&flow);
        handles.push(tokio::spawn(async move {
            let mut job = ProcessingJob::new(i, work_item(i), &[Section::Summary]);
            flow.run(&mut job, &CancelFlag::new()).await.unwrap();
            job.state()
        }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap(), JobState::Completed);
    }

    // 登录从不并发；第一个任务登录后，其余任务复用缓存会话
    assert!(!extractor.login_overlap.load(Ordering::SeqCst));
    assert_eq!(extractor.login_count.load(Ordering::SeqCst), 1);
    assert_eq!(results.persisted().len(), 3);
}

#[tokio::test]
async fn cancelled_job_is_recorded_as_cancelled() {
    let tmp = TempDir::new().unwrap();
    let extractor = Arc::new(MockExtractor::new(tmp.path()));
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::accepting()),
        results.clone(),
    )
    .await;

    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut job = ProcessingJob::new(1, work_item(1), &[]);
    flow.run(&mut job, &cancel).await.unwrap();

    assert_eq!(job.state(), JobState::Failed(FailureKind::Cancelled));
    let records = results.persisted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "cancelled");
    // 所有 section 都被标记为 skipped
    assert!(records[0].sections.values().all(|s| s == "skipped"));
}

#[tokio::test]
async fn upload_rejection_does_not_block_persistence() {
    let tmp = TempDir::new().unwrap();
    let extractor = Arc::new(MockExtractor::new(tmp.path()));
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::rejecting()),
        results.clone(),
    )
    .await;

    let mut job = ProcessingJob::new(1, work_item(1), &[Section::Summary, Section::Document]);
    flow.run(&mut job, &CancelFlag::new()).await.unwrap();

    assert_eq!(job.state(), JobState::Completed);
    let records = results.persisted();
    assert_eq!(records.len(), 1);
    // 记录照常持久化，产物 URL 为 null
    assert!(!records[0].artifacts.is_empty());
    assert!(records[0].artifacts.iter().all(|a| a.url.is_none()));
    // 上传彻底失败后本地文件也不残留
    for artifact in &job.artifacts {
        assert!(artifact.local_path.is_none());
    }
    for dir in [tmp.path().to_path_buf(), tmp.path().join("artifacts")] {
        if !dir.exists() {
            continue;
        }
        let leftover = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.ends_with(".pdf") || name.ends_with(".csv")
            })
            .count();
        assert_eq!(leftover, 0, "目录 {} 里不应残留产物", dir.display());
    }
}

#[tokio::test]
async fn persist_failure_is_terminal() {
    let tmp = TempDir::new().unwrap();
    let extractor = Arc::new(MockExtractor::new(tmp.path()));
    let flow = make_flow(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::accepting()),
        Arc::new(MockResultStore::failing()),
    )
    .await;

    let mut job = ProcessingJob::new(1, work_item(1), &[Section::Summary]);
    let result = flow.run(&mut job, &CancelFlag::new()).await;

    assert!(result.is_err());
    assert_eq!(job.state(), JobState::Failed(FailureKind::Persist));
}

#[tokio::test]
async fn cancel_during_section_finishes_in_flight_section_first() {
    let tmp = TempDir::new().unwrap();
    let cancel = CancelFlag::new();
    // Summary 抓到一半时置位取消标志
    let extractor = Arc::new(MockExtractor {
        download_dir: tmp.path().to_path_buf(),
        cancel_during_extract: Some(cancel.clone()),
        ..Default::default()
    });
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::accepting()),
        results.clone(),
    )
    .await;

    let mut job = ProcessingJob::new(
        1,
        work_item(1),
        &[Section::Summary, Section::Entries, Section::CustomReport],
    );
    flow.run(&mut job, &cancel).await.unwrap();

    // 进行中的 section 跑到终态，剩余的在边界被跳过
    assert_eq!(job.state(), JobState::Failed(FailureKind::Cancelled));
    let records = results.persisted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, "cancelled");
    assert_eq!(records[0].sections["summary"], "succeeded");
    assert_eq!(records[0].sections["entries"], "skipped");
    assert_eq!(records[0].sections["custom-report"], "skipped");
}

#[tokio::test]
async fn document_section_uses_relaxed_timeout() {
    let tmp = TempDir::new().unwrap();
    // Document 比普通操作超时慢，但在专用超时以内
    let extractor = Arc::new(MockExtractor {
        download_dir: tmp.path().to_path_buf(),
        document_delay: Duration::from_millis(150),
        ..Default::default()
    });
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow_with_timeouts(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::accepting()),
        results.clone(),
        Duration::from_millis(50),
        Duration::from_secs(5),
    )
    .await;

    let mut job = ProcessingJob::new(1, work_item(1), &[Section::Summary, Section::Document]);
    flow.run(&mut job, &CancelFlag::new()).await.unwrap();

    assert_eq!(job.state(), JobState::Completed);
    let records = results.persisted();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sections["document"], "succeeded");
}

#[tokio::test]
async fn hung_probe_falls_back_to_fresh_login() {
    let tmp = TempDir::new().unwrap();
    // 先留一个缓存会话，让流程走到探测
    let store = SessionStore::new(tmp.path().join("sessions")).await.unwrap();
    store
        .save("HYX", json!([{"name": "JSESSIONID", "value": "stale"}]))
        .await
        .unwrap();

    let extractor = Arc::new(MockExtractor {
        download_dir: tmp.path().to_path_buf(),
        probe_delay: Duration::from_secs(10),
        ..Default::default()
    });
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow_with_timeouts(
        &tmp,
        extractor.clone(),
        Arc::new(MockArtifactStore::accepting()),
        results.clone(),
        Duration::from_millis(100),
        Duration::from_millis(100),
    )
    .await;

    let mut job = ProcessingJob::new(1, work_item(1), &[Section::Summary]);
    flow.run(&mut job, &CancelFlag::new()).await.unwrap();

    // 探测超时按会话失效处理，重新登录后任务照常完成
    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(extractor.login_count.load(Ordering::SeqCst), 1);
    assert_eq!(results.persisted().len(), 1);
}

#[tokio::test]
async fn duplicate_mawbs_produce_independent_records() {
    let tmp = TempDir::new().unwrap();
    let extractor = Arc::new(MockExtractor::new(tmp.path()));
    let results = Arc::new(MockResultStore::working());
    let flow = make_flow(
        &tmp,
        extractor,
        Arc::new(MockArtifactStore::accepting()),
        results.clone(),
    )
    .await;

    for i in 1..=2 {
        let mut job = ProcessingJob::new(i, work_item(i), &[Section::Summary]);
        flow.run(&mut job, &CancelFlag::new()).await.unwrap();
        assert_eq!(job.state(), JobState::Completed);
    }

    let records = results.persisted();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].mawb, records[1].mawb);
}
