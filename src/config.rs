//! 程序配置
//!
//! 配置在启动时一次性加载，之后不可变；需要改配置就重启进程。
//! 来源有两种：外部解密能力产出的 TOML 文本（加密 blob 路径），
//! 或者明文 config.toml 兜底。加载后还允许环境变量覆盖单项。
//! 缺少必需项（身份后端、对象存储）是致命错误

use crate::error::{AppResult, ConfigError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// 单个 broker 的凭据和格式配置
#[derive(Clone, Debug, Deserialize)]
pub struct BrokerConfig {
    pub username: String,
    pub password: String,
    /// entries 报表格式（决定自定义报表怎么解析）
    #[serde(default = "default_entries_format")]
    pub entries_format: String,
}

fn default_entries_format() -> String {
    "allied".to_string()
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// 同时处理的任务数量
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// 登录最大尝试次数
    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,
    /// 每个 section 的最大尝试次数
    #[serde(default = "default_section_attempts")]
    pub section_attempts: u32,
    /// 重试退避的基础延迟（毫秒），之后每次翻倍
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 单次挂起操作（登录/抓取/上传/持久化）的超时（秒）
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Document section（7501 批量 PDF）的专用超时（秒），生成可能要数分钟
    #[serde(default = "default_document_timeout_secs")]
    pub document_timeout_secs: u64,
    /// 会话文件目录
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
    /// 本地产物的临时目录
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    /// 是否无头模式启动浏览器
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// 连接已有浏览器的调试端口；不设置就自行启动浏览器
    #[serde(default)]
    pub browser_debug_port: Option<u16>,
    // --- 身份后端（必需） ---
    #[serde(default)]
    pub identity_url: String,
    #[serde(default)]
    pub identity_service_key: String,
    // --- 对象存储 / 结果存储（必需） ---
    #[serde(default)]
    pub storage_url: String,
    #[serde(default)]
    pub storage_bucket: String,
    // --- broker 凭据表 ---
    #[serde(default)]
    pub brokers: BTreeMap<String, BrokerConfig>,
}

fn default_max_concurrent_jobs() -> usize {
    3
}
fn default_login_attempts() -> u32 {
    3
}
fn default_section_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_operation_timeout_secs() -> u64 {
    120
}
fn default_document_timeout_secs() -> u64 {
    1800
}
fn default_sessions_dir() -> String {
    "sessions".to_string()
}
fn default_download_dir() -> String {
    "downloads".to_string()
}
fn default_headless() -> bool {
    true
}

impl Config {
    /// 从 TOML 文本解析配置（外部解密能力的产出直接走这里）
    pub fn from_toml_str(content: &str, source: &str) -> AppResult<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
                path: source.to_string(),
                source: Box::new(e),
            })?;
        // broker 代码统一大写，和解析器的归一化保持一致
        config.brokers = std::mem::take(&mut config.brokers)
            .into_iter()
            .map(|(code, broker)| (code.to_ascii_uppercase(), broker))
            .collect();
        config.apply_env_overrides();
        config.validate_required()?;
        Ok(config)
    }

    /// 从明文配置文件加载
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// 环境变量覆盖单个配置项
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("MAX_CONCURRENT_JOBS") {
            self.max_concurrent_jobs = v;
        }
        if let Some(v) = env_parse("LOGIN_ATTEMPTS") {
            self.login_attempts = v;
        }
        if let Some(v) = env_parse("SECTION_ATTEMPTS") {
            self.section_attempts = v;
        }
        if let Some(v) = env_parse("RETRY_BASE_DELAY_MS") {
            self.retry_base_delay_ms = v;
        }
        if let Some(v) = env_parse("OPERATION_TIMEOUT_SECS") {
            self.operation_timeout_secs = v;
        }
        if let Some(v) = env_parse("DOCUMENT_TIMEOUT_SECS") {
            self.document_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("SESSIONS_DIR") {
            self.sessions_dir = v;
        }
        if let Ok(v) = std::env::var("DOWNLOAD_DIR") {
            self.download_dir = v;
        }
        if let Some(v) = env_parse("HEADLESS") {
            self.headless = v;
        }
        if let Some(v) = env_parse("BROWSER_DEBUG_PORT") {
            self.browser_debug_port = Some(v);
        }
        if let Ok(v) = std::env::var("IDENTITY_URL") {
            self.identity_url = v;
        }
        if let Ok(v) = std::env::var("IDENTITY_SERVICE_KEY") {
            self.identity_service_key = v;
        }
        if let Ok(v) = std::env::var("STORAGE_URL") {
            self.storage_url = v;
        }
        if let Ok(v) = std::env::var("STORAGE_BUCKET") {
            self.storage_bucket = v;
        }
    }

    /// 校验必需项，缺了就是启动致命错误
    fn validate_required(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.identity_url.is_empty() {
            missing.push("identity_url".to_string());
        }
        if self.identity_service_key.is_empty() {
            missing.push("identity_service_key".to_string());
        }
        if self.storage_url.is_empty() {
            missing.push("storage_url".to_string());
        }
        if self.storage_bucket.is_empty() {
            missing.push("storage_bucket".to_string());
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys { keys: missing });
        }
        if self.brokers.is_empty() {
            return Err(ConfigError::NoBrokers);
        }
        Ok(())
    }

    /// 配置里所有 broker 代码（给解析器做校验用）
    pub fn broker_codes(&self) -> Vec<String> {
        self.brokers.keys().cloned().collect()
    }

    /// 查找某个 broker 的配置
    pub fn broker(&self, code: &str) -> Option<&BrokerConfig> {
        self.brokers.get(code)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
identity_url = "https://id.example.com"
identity_service_key = "key"
storage_url = "https://storage.example.com"
storage_bucket = "duty-artifacts"

[brokers.HYX]
username = "user"
password = "pass"
"#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = Config::from_toml_str(MINIMAL, "test").unwrap();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.login_attempts, 3);
        assert!(config.headless);
        assert_eq!(config.broker("HYX").unwrap().entries_format, "allied");
        assert_eq!(config.broker_codes(), vec!["HYX".to_string()]);
    }

    #[test]
    fn broker_keys_are_normalized_to_uppercase() {
        let content = MINIMAL.replace("[brokers.HYX]", "[brokers.hyx]");
        let config = Config::from_toml_str(&content, "test").unwrap();
        // 小写配置的 broker 也能被大写代码的工作项找到
        assert_eq!(config.broker_codes(), vec!["HYX".to_string()]);
        assert!(config.broker("HYX").is_some());
    }

    #[test]
    fn missing_required_keys_is_fatal() {
        let result = Config::from_toml_str("identity_url = \"x\"", "test");
        assert!(result.is_err());
    }

    #[test]
    fn no_brokers_is_fatal() {
        let content = r#"
identity_url = "https://id.example.com"
identity_service_key = "key"
storage_url = "https://storage.example.com"
storage_bucket = "bucket"
"#;
        let result = Config::from_toml_str(content, "test");
        assert!(result.is_err());
    }
}
