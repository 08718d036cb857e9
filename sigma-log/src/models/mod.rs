//! 数据模型模块
//!
//! 包含所有核心数据结构:
//! - log_entry: 日志条目 (级别、消息、附加数据、时间戳、来源)
//! - log_config: 投递配置 (端点、容量、持久化位置)
//! - errors: 错误类型定义 (投递、存储)

pub mod errors;
pub mod log_config;
pub mod log_entry;

// 重导出常用类型,简化外部引用
pub use errors::{DeliveryError, StorageError};
pub use log_config::{ConfigError, LogConfig};
pub use log_entry::{ErrorPayload, LogEntry, LogLevel, LogOrigin};
