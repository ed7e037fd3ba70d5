//! 任务上下文
//!
//! 在流程各步骤之间传递的只读信息，主要用于日志

/// 任务上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 任务编号（从 1 开始，仅用于日志）
    pub job_index: usize,
    /// MAWB 显示格式（xxx-xxxxxxxx）
    pub mawb: String,
    pub broker_code: String,
}

impl JobCtx {
    pub fn new(job_index: usize, mawb: String, broker_code: String) -> Self {
        Self {
            job_index,
            mawb,
            broker_code,
        }
    }
}
