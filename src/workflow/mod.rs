//! 流程层
//!
//! 定义单个任务的完整处理流程，不持有浏览器资源

pub mod job_ctx;
pub mod job_flow;

pub use job_ctx::JobCtx;
pub use job_flow::JobFlow;
