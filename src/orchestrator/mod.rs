//! 编排层
//!
//! 批量调度、并发控制和资源管理

pub mod batch_processor;
pub mod job_processor;

pub use batch_processor::{App, ProcessingStats};
