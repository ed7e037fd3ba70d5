//! 产物上传
//!
//! 报告和 PDF 上传到对象存储，拿回可访问的 URL。
//! 4xx 视为永久拒绝（不重试），网络错误可重试

use crate::services::extractor::UploadError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// 产物存储能力
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// 上传本地文件，返回远端 URL
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<String, UploadError>;
}

/// 对象存储的 REST 实现
pub struct RestArtifactStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: String,
}

impl RestArtifactStore {
    pub fn new(base_url: &str, bucket: &str, api_key: &str) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("构造 HTTP 客户端失败: {}", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ArtifactStore for RestArtifactStore {
    async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, remote_name
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if status.is_client_error() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(UploadError::RequestFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let public_url = format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, remote_name
        );
        info!("📤 已上传 {} ({} bytes)", remote_name, size);
        Ok(public_url)
    }
}
