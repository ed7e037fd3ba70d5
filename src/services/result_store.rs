//! 结果持久化与查询
//!
//! 每个任务结束时把 DutyRecord 写进结果存储（按 MAWB+批次 upsert），
//! search 子命令按 MAWB 查历史记录。
//! 写入失败是终止性错误：任务不能算完成，也不自动重试

use crate::models::DutyRecord;
use crate::services::extractor::PersistError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const RESULTS_TABLE: &str = "duty_results";

/// 结果存储能力
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 写入（或覆盖）一条处理结果
    async fn persist(&self, record: &DutyRecord) -> Result<(), PersistError>;

    /// 按 MAWB 查询历史结果，最新的在前
    async fn search(&self, mawb: &str, limit: usize) -> Result<Vec<DutyRecord>, PersistError>;
}

/// 结果存储的 REST 实现
pub struct RestResultStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestResultStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("构造 HTTP 客户端失败: {}", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, RESULTS_TABLE)
    }
}

#[async_trait]
impl ResultStore for RestResultStore {
    async fn persist(&self, record: &DutyRecord) -> Result<(), PersistError> {
        let body = serde_json::to_vec(record)?;
        let response = self
            .http
            .post(self.table_url())
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates")
            .body(body)
            .send()
            .await
            .map_err(|e| PersistError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::Rejected {
                status: status.as_u16(),
            });
        }
        info!("💾 结果已持久化: {} ({})", record.mawb, record.status);
        Ok(())
    }

    async fn search(&self, mawb: &str, limit: usize) -> Result<Vec<DutyRecord>, PersistError> {
        let url = format!(
            "{}?mawb=eq.{}&order=started_at.desc&limit={}",
            self.table_url(),
            mawb,
            limit
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| PersistError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::Rejected {
                status: status.as_u16(),
            });
        }
        let records: Vec<DutyRecord> = response
            .json()
            .await
            .map_err(|e| PersistError::RequestFailed(format!("响应解析失败: {}", e)))?;
        Ok(records)
    }
}
