//! 会话管理
//!
//! 每个 broker 一份缓存的登录会话：`store` 负责落盘（原子替换），
//! `locks` 保证同一 broker 的 登录/探测/保存 序列串行执行。
//! 有效性由编排层通过抓取能力的 probe 判定，这里只管存取

pub mod locks;
pub mod store;

pub use locks::BrokerLocks;
pub use store::{BrokerSession, SessionStore};
