//! 服务层模块
//!
//! - `log_delivery`: 日志投递子系统,唯一的对外入口
//! - `log_queue`: 有界FIFO队列
//! - `log_endpoint`: 远端端点抽象 (HTTP / 空实现)
//! - `kv_store`: 持久化键值存储抽象 (文件 / 内存 / 空实现)
//! - `connectivity`: 连通性信号与探测
//!
//! # 服务架构
//!
//! ```text
//!   Auth / 文档存储 / 仪表盘 ...
//!              │ record(level, message, data)
//!              ▼
//! ┌──────────────────────────────────────┐
//! │            LogDelivery               │
//! │  ┌──────────┐  ┌──────────────────┐  │
//! │  │ LogQueue │  │ connected: bool  │◄─┼── ConnectivitySignal
//! │  └────┬─────┘  └──────────────────┘  │
//! └───────┼──────────────────┬───────────┘
//!         ▼                  ▼
//!   KeyValueStore       LogEndpoint
//! ```
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use sigma_log::models::LogConfig;
//! use sigma_log::services::{HttpEndpoint, LogDelivery, MemoryStore};
//!
//! # async fn example() {
//! let config = LogConfig::default();
//! let delivery = LogDelivery::new(
//!     &config,
//!     Arc::new(HttpEndpoint::new("https://logs.sigma.local/client")),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! delivery.initialize(None).await;
//! delivery.warning("库存低于阈值", Some(serde_json::json!({"sku": "CAB-0042"})));
//! delivery.shutdown().await;
//! # }
//! ```

pub mod connectivity;
pub mod kv_store;
pub mod log_delivery;
pub mod log_endpoint;
pub mod log_queue;

// 重导出常用类型,简化外部引用
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal};
pub use kv_store::{FileStore, KeyValueStore, MemoryStore, NoopStore};
pub use log_delivery::LogDelivery;
pub use log_endpoint::{HttpEndpoint, LogEndpoint, NoopEndpoint};
pub use log_queue::LogQueue;
