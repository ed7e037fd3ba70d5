//! 抓取能力契约
//!
//! 编排层只依赖这里的 trait，不关心具体门户怎么实现。
//! 实际实现见 `netchb`，测试里用内存 mock 替换

use crate::models::{Section, SectionData, WorkItem};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use thiserror::Error;

/// 登录凭据（来自配置的 broker 表）
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// entries 报表格式标识
    pub entries_format: String,
}

/// 登录失败
#[derive(Debug, Error)]
pub enum LoginError {
    /// 门户拒绝了凭据（重试也没用）
    #[error("broker {broker} 的凭据被拒绝")]
    CredentialsRejected { broker: String },
    /// 登录页交互失败（元素找不到、页面加载异常等）
    #[error("登录页交互失败: {0}")]
    Interaction(String),
    /// 登录等待超时
    #[error("登录超时")]
    Timeout,
}

/// 单个 section 抓取失败
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("{section} 抓取失败: {reason}")]
    Extraction { section: &'static str, reason: String },
    #[error("{section} 抓取超时")]
    Timeout { section: &'static str },
}

impl SectionError {
    pub fn extraction(section: Section, reason: impl Into<String>) -> Self {
        SectionError::Extraction {
            section: section.name(),
            reason: reason.into(),
        }
    }
}

/// 文档下载失败
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("文档请求失败: {0}")]
    RequestFailed(String),
    #[error("文档请求返回 HTTP {status}")]
    HttpStatus { status: u16 },
    #[error("文档写入本地失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("该任务没有可下载的文档")]
    NotAvailable,
}

/// 产物上传失败
#[derive(Debug, Error)]
pub enum UploadError {
    /// 网络层失败（可重试）
    #[error("上传请求失败: {0}")]
    RequestFailed(String),
    /// 存储端拒绝（永久失败，不再重试）
    #[error("存储端拒绝上传: HTTP {status}")]
    Rejected { status: u16 },
    #[error("读取本地产物失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果持久化失败
///
/// 这是终止性错误：记录写不进去，任务不能算完成，也不自动重试
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("持久化请求失败: {0}")]
    RequestFailed(String),
    #[error("结果存储拒绝写入: HTTP {status}")]
    Rejected { status: u16 },
    #[error("结果序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 门户抓取能力
///
/// 会话状态以不透明 JSON blob 的形式在这里进出，
/// 调用方（workflow）负责落盘和串行化，实现方只管用
#[async_trait]
pub trait SectionExtractor: Send + Sync {
    /// 用凭据完成一次登录，返回可缓存的会话状态
    async fn login(
        &self,
        broker_code: &str,
        credentials: &Credentials,
    ) -> Result<JsonValue, LoginError>;

    /// 探测缓存的会话是否仍然有效
    ///
    /// 任何探测异常都按「无效」处理，调用方会走重新登录
    async fn probe(&self, state_blob: &JsonValue) -> bool;

    /// 抓取一个 section 的数据
    async fn extract(
        &self,
        state_blob: &JsonValue,
        section: Section,
        item: &WorkItem,
    ) -> Result<SectionData, SectionError>;

    /// 下载任务关联的文档（7501 批量 PDF），返回本地路径
    async fn download_document(
        &self,
        state_blob: &JsonValue,
        item: &WorkItem,
    ) -> Result<PathBuf, DownloadError>;
}
