//! # NetCHB Duty Runner
//!
//! 一个批量抓取 NetCHB 报关门户关税数据的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `PortalDriver` - 页面 owner，提供导航/JS/表单/会话状态能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个任务
//! - `SectionExtractor` - 抓取能力契约（登录/探测/抓取/下载）
//! - `NetChbPortal` - NetCHB 门户的具体实现
//! - `ArtifactStore` / `ResultStore` - 产物上传与结果持久化
//! - `AuthService` - 操作员身份验证
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个 MAWB"的完整处理流程
//! - `JobCtx` - 上下文封装（任务编号 + MAWB + broker）
//! - `JobFlow` - 流程编排（会话 → section → 报告 → 上传 → 持久化）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量任务处理器，管理资源和并发
//! - `orchestrator/job_processor` - 单个任务处理器，计时与收尾
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::PortalDriver;
pub use models::{DutyRecord, ProcessingJob, Section, WorkItem};
pub use orchestrator::{App, ProcessingStats};
pub use parser::{parse_batch_input, ParseOutcome};
pub use session::{BrokerLocks, BrokerSession, SessionStore};
pub use utils::CancelFlag;
pub use workflow::{JobCtx, JobFlow};
