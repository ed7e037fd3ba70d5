//! 本地会话存储
//!
//! 每个 broker 在磁盘上最多只有一个会话文件，保存时整体替换，
//! 不追加、不保留历史版本。写入走"临时文件 + 原子重命名"，
//! 进程在写一半时崩溃也不会留下损坏的会话文件

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

/// 一个 broker 的缓存登录会话
///
/// `state_blob` 是不透明的序列化浏览器状态（cookies 等），
/// 有效性永远通过探测得出，不落盘
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSession {
    pub broker_id: String,
    pub state_blob: JsonValue,
    pub saved_at: DateTime<Utc>,
}

/// 会话存储
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// 创建会话存储，目录不存在时自动建立
    pub async fn new(sessions_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let sessions_dir = sessions_dir.into();
        fs::create_dir_all(&sessions_dir)
            .await
            .map_err(|e| AppError::session_write_failed(sessions_dir.display().to_string(), e))?;
        info!("会话存储目录: {}", sessions_dir.display());
        Ok(Self { sessions_dir })
    }

    /// broker 会话文件的路径
    pub fn session_path(&self, broker_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("broker_{}.json", broker_id))
    }

    /// 读取 broker 的缓存会话
    ///
    /// 文件不存在返回 None；内容损坏也返回 None（告警后当作没有缓存，
    /// 下次成功登录会覆盖掉坏文件），永远不信任未经探测的会话
    pub async fn load(&self, broker_id: &str) -> AppResult<Option<BrokerSession>> {
        let path = self.session_path(broker_id);
        if !path.exists() {
            debug!("broker {} 没有缓存会话", broker_id);
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::session_read_failed(path.display().to_string(), e))?;

        match serde_json::from_str::<BrokerSession>(&content) {
            Ok(session) => {
                info!(
                    "已加载 broker {} 的缓存会话（保存于 {}）",
                    broker_id,
                    session.saved_at.format("%Y-%m-%d %H:%M:%S")
                );
                Ok(Some(session))
            }
            Err(e) => {
                warn!(
                    "⚠️ broker {} 的会话文件损坏，忽略: {} ({})",
                    broker_id,
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// 保存 broker 的会话，整体替换旧文件
    ///
    /// 先写同目录下的临时文件再 rename，保证替换是原子的
    pub async fn save(&self, broker_id: &str, state_blob: JsonValue) -> AppResult<BrokerSession> {
        let session = BrokerSession {
            broker_id: broker_id.to_string(),
            state_blob,
            saved_at: Utc::now(),
        };

        let path = self.session_path(broker_id);
        let tmp_path = self
            .sessions_dir
            .join(format!(".broker_{}.json.tmp", broker_id));

        let content = serde_json::to_string_pretty(&session)
            .map_err(|e| AppError::session_write_failed(path.display().to_string(), e))?;

        fs::write(&tmp_path, content)
            .await
            .map_err(|e| AppError::session_write_failed(tmp_path.display().to_string(), e))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| AppError::session_write_failed(path.display().to_string(), e))?;

        info!("✓ 已保存 broker {} 的会话到 {}", broker_id, path.display());
        Ok(session)
    }

    /// 是否存在某个 broker 的会话文件
    pub fn has_session(&self, broker_id: &str) -> bool {
        self.session_path(broker_id).exists()
    }
}
