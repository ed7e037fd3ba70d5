//! 按 broker 的互斥锁
//!
//! 同一个 broker 同一时刻只允许一个 登录/探测/保存 临界区在执行，
//! 避免多个任务竞态覆盖会话文件。不同 broker 之间互不影响

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// broker 锁注册表
///
/// 锁在第一次用到某个 broker 时惰性创建，之后复用
#[derive(Debug, Default)]
pub struct BrokerLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BrokerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某个 broker 的互斥锁
    ///
    /// 返回 owned guard，持有期间该 broker 的其他
    /// 登录/探测/保存 序列都会等待
    pub async fn acquire(&self, broker_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(broker_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
