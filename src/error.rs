use std::fmt;

/// 应用程序错误类型
///
/// 能力边界的错误（登录/抓取/上传/持久化）由各自的 thiserror 枚举承载，
/// 不在这里重复；这里只收基础设施和启动阶段的错误
#[derive(Debug)]
pub enum AppError {
    /// 浏览器相关错误
    Browser(BrowserError),
    /// 会话存取错误
    Session(SessionError),
    /// 配置错误（启动时致命）
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Browser(e) => write!(f, "浏览器错误: {}", e),
            AppError::Session(e) => write!(f, "会话错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Browser(e) => Some(e),
            AppError::Session(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 浏览器相关错误
#[derive(Debug)]
pub enum BrowserError {
    /// 启动浏览器失败
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::LaunchFailed { source } => {
                write!(f, "启动浏览器失败: {}", source)
            }
            BrowserError::PageCreationFailed { source } => {
                write!(f, "创建页面失败: {}", source)
            }
            BrowserError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            BrowserError::ScriptExecutionFailed { source } => {
                write!(f, "执行脚本失败: {}", source)
            }
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrowserError::LaunchFailed { source }
            | BrowserError::PageCreationFailed { source }
            | BrowserError::NavigationFailed { source, .. }
            | BrowserError::ScriptExecutionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 输入行解析错误
///
/// 只影响单行，不影响整个批次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// 字段数量不对
    InvalidTokenCount { line_no: usize, found: usize },
    /// MAWB 不是 11 位数字
    InvalidMawb { line_no: usize, mawb: String },
    /// 未知的 broker 代码
    UnknownBroker { line_no: usize, code: String },
    /// 未知的机场代码
    UnknownAirport { line_no: usize, code: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidTokenCount { line_no, found } => {
                write!(f, "第 {} 行: 需要 5 个字段，实际 {} 个", line_no, found)
            }
            ParseError::InvalidMawb { line_no, mawb } => {
                write!(f, "第 {} 行: MAWB '{}' 必须是 11 位数字", line_no, mawb)
            }
            ParseError::UnknownBroker { line_no, code } => {
                write!(f, "第 {} 行: 未知的 broker 代码 '{}'", line_no, code)
            }
            ParseError::UnknownAirport { line_no, code } => {
                write!(f, "第 {} 行: 未知的机场代码 '{}'", line_no, code)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    /// 错误所在的输入行号
    pub fn line_no(&self) -> usize {
        match self {
            ParseError::InvalidTokenCount { line_no, .. }
            | ParseError::InvalidMawb { line_no, .. }
            | ParseError::UnknownBroker { line_no, .. }
            | ParseError::UnknownAirport { line_no, .. } => *line_no,
        }
    }
}

/// 会话存取错误
#[derive(Debug)]
pub enum SessionError {
    /// 读取会话文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入会话文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 会话内容损坏
    Corrupted { path: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ReadFailed { path, source } => {
                write!(f, "读取会话文件失败 ({}): {}", path, source)
            }
            SessionError::WriteFailed { path, source } => {
                write!(f, "写入会话文件失败 ({}): {}", path, source)
            }
            SessionError::Corrupted { path } => write!(f, "会话文件已损坏: {}", path),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::ReadFailed { source, .. } | SessionError::WriteFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            SessionError::Corrupted { .. } => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件不存在
    FileNotFound { path: String },
    /// 配置文件解析失败
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 缺少必需的配置项
    MissingKeys { keys: Vec<String> },
    /// 未配置任何 broker
    NoBrokers,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound { path } => write!(f, "配置文件不存在: {}", path),
            ConfigError::ParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
            ConfigError::MissingKeys { keys } => {
                write!(f, "缺少必需的配置项: {}", keys.join(", "))
            }
            ConfigError::NoBrokers => write!(f, "配置中没有任何 broker"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON 序列化失败: {}", err))
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn browser_launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建导航错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建会话读取错误
    pub fn session_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Session(SessionError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建会话写入错误
    pub fn session_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Session(SessionError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
