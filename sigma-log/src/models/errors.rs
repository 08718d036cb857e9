use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 远端投递相关错误
///
/// 投递失败从不传给调用方,只用于驱动本地缓存。
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum DeliveryError {
    /// 网络请求失败
    ///
    /// 可能原因:
    /// - 网络连接中断
    /// - 日志端点不可达
    /// - DNS解析失败
    #[error("网络请求失败: {0}")]
    Network(String),

    /// 远端拒绝
    ///
    /// 端点返回了非2xx状态码
    #[error("日志端点拒绝 {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// 持久化存储相关错误
///
/// 只在本地记录,内存队列始终是权威数据。
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum StorageError {
    /// 读写存储介质失败
    #[error("存储I/O失败: {0}")]
    Io(String),

    /// 存储空间不足
    ///
    /// 对应浏览器 localStorage 配额耗尽
    #[error("存储空间不足: 键 {key} 超出 {limit} 字节限制")]
    QuotaExceeded { key: String, limit: usize },

    /// 持久化数据格式错误
    #[error("持久化数据格式错误: {0}")]
    Serialization(String),
}

/// 实现从reqwest::Error到DeliveryError的转换
impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Network("请求超时".to_string())
        } else if err.is_connect() {
            DeliveryError::Network("无法连接到日志端点".to_string())
        } else if let Some(status) = err.status() {
            DeliveryError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            DeliveryError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// 实现从std::io::Error到StorageError的转换
impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                StorageError::Io(format!("Permission denied: {}", err))
            }
            _ => StorageError::Io(err.to_string()),
        }
    }
}
