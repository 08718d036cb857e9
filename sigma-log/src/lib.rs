//! SIGMA 客户端日志投递
//!
//! 缓冲结构化日志,在线时转发到远端端点,断网时持久化缓存,
//! 恢复连接后按顺序重放。记录日志永远不会影响调用方的控制流。

pub mod models;
pub mod services;
pub mod utils;

pub use models::{LogConfig, LogEntry, LogLevel};
pub use services::LogDelivery;
