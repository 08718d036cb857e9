//! 日志条目模型
//!
//! 定义客户端日志的数据结构,用于本地输出、远端投递与断网持久化。
//! 条目一经创建即不可变,序列化格式与浏览器端 `SIGMA_LOG_QUEUE` 保持一致。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 日志级别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// 不区分大小写,`WARN` 视为 `WARNING`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("未知日志级别: {}", other)),
        }
    }
}

/// 日志来源上下文
///
/// 每个投递子系统实例固定一份,创建条目时复制进去。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOrigin {
    /// 当前页面/客户端URL
    pub url: Option<String>,
    /// 用户代理字符串
    pub user_agent: Option<String>,
}

impl LogOrigin {
    pub fn new(url: Option<String>, user_agent: Option<String>) -> Self {
        Self { url, user_agent }
    }

    /// 以本程序名和版本作为用户代理
    pub fn for_this_client(url: Option<String>) -> Self {
        Self {
            url,
            user_agent: Some(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )),
        }
    }
}

/// 错误对象的规范化表示
///
/// ERROR 级别日志携带错误时,统一转换为 `{name, message, stack}`。
/// `stack` 由 `source()` 链逐行展开,没有下层原因时为 `None`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorPayload {
    /// 从任意错误类型构造
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized + 'static,
    {
        // 去掉路径和泛型参数,只留类型名
        let full = std::any::type_name::<E>();
        let name = full
            .split('<')
            .next()
            .unwrap_or(full)
            .rsplit("::")
            .next()
            .unwrap_or("Error")
            .to_string();

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            name,
            message: err.to_string(),
            stack: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
        }
    }

    pub fn into_value(self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "message": self.message,
            "stack": self.stack,
        })
    }
}

/// 客户端日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// 唯一标识,重放合并时的去重键
    ///
    /// 旧版持久化数据没有该字段,加载时补一个新值
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// 日志级别
    pub level: LogLevel,
    /// 日志消息
    pub message: String,
    /// 附加数据 (JSON格式)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// 创建时间 (ISO-8601)
    pub timestamp: DateTime<Utc>,
    /// 来源上下文
    #[serde(flatten)]
    pub origin: LogOrigin,
}

impl LogEntry {
    /// 创建新条目,时间戳取当前时间
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
        origin: LogOrigin,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            data,
            timestamp: Utc::now(),
            origin,
        }
    }

    /// 去重键
    pub fn dedup_key(&self) -> Uuid {
        self.id
    }
}
