//! 浏览器层
//!
//! 负责启动/连接 Chromium 并交出 Page，不认识门户业务

pub mod connection;

pub use connection::{connect_to_browser, launch_browser};
