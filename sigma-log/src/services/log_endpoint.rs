//! 远端日志端点
//!
//! 一次调用投递一条日志,成功即确认,失败返回 `DeliveryError`。

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{DeliveryError, LogEntry, LogLevel};

/// 远端投递端点
#[async_trait]
pub trait LogEndpoint: Send + Sync {
    /// 投递单条日志
    async fn send(&self, entry: &LogEntry) -> Result<(), DeliveryError>;

    /// 是否存在真实的远端
    ///
    /// 返回 `false` 时 `record` 只输出到控制台
    fn is_remote(&self) -> bool {
        true
    }
}

/// 请求体: 与服务端 `logFromClient(level, message, data)` 对应
#[derive(Debug, Serialize)]
struct RemoteLogRequest<'a> {
    level: LogLevel,
    message: &'a str,
    data: Option<&'a serde_json::Value>,
}

/// HTTP端点
///
/// 以JSON POST投递,2xx视为确认。不设置请求超时。
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        let url = url.into();
        tracing::info!(endpoint = %url, "HTTP日志端点已创建");
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LogEndpoint for HttpEndpoint {
    async fn send(&self, entry: &LogEntry) -> Result<(), DeliveryError> {
        let body = RemoteLogRequest {
            level: entry.level,
            message: &entry.message,
            data: entry.data.as_ref(),
        };

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        tracing::trace!(条目ID = %entry.id, status = %status, "日志已送达");
        Ok(())
    }
}

/// 空端点
///
/// 非交互环境使用: 不投递,也不入队
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEndpoint;

#[async_trait]
impl LogEndpoint for NoopEndpoint {
    async fn send(&self, _entry: &LogEntry) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn is_remote(&self) -> bool {
        false
    }
}
