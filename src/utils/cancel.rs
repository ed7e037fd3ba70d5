//! 协作式取消
//!
//! 一个可克隆的取消标志。挂起中的操作不会被打断，
//! 编排层只在状态机边界检查它

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 取消标志
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消（幂等）
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
        // 幂等
        flag.cancel();
        assert!(flag.is_cancelled());
    }
}
