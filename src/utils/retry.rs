//! 统一的重试原语
//!
//! 登录、section 抓取、文档下载共用同一个带退避的重试逻辑，
//! 只通过 (最大次数, 基础延迟) 两个参数区分

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次失败后的等待时间，之后每次翻倍
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 第 attempt 次失败后的退避时间（attempt 从 1 开始）
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// 执行操作直到成功或次数耗尽
    ///
    /// `label` 只用于日志；`on_attempt` 让调用方统计尝试次数
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut on_attempt: impl FnMut(u32),
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            on_attempt(attempt);
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "⚠️ {} 第 {}/{} 次失败: {}，{}ms 后重试",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
