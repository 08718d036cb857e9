use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 默认队列容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// 默认持久化键,与浏览器端 localStorage 键一致
pub const DEFAULT_STORAGE_KEY: &str = "SIGMA_LOG_QUEUE";

/// 默认连通性探测间隔 (秒)
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 15;

/// 配置错误
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ConfigError {
    /// 配置值无效
    #[error("配置项 {key} 的值无效: {value}")]
    InvalidValue { key: String, value: String },

    /// I/O错误
    ///
    /// 读取 .env 文件时的文件系统错误
    #[error("I/O错误: {0}")]
    Io(String),
}

/// 日志投递配置
///
/// 每个字段对应一个 `SIGMA_*` 环境变量,缺省值见各字段说明。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 远端日志端点 (`SIGMA_LOG_ENDPOINT`)
    ///
    /// 未配置时只输出到控制台,不进入投递管线
    pub endpoint_url: Option<String>,

    /// 队列容量 (`SIGMA_LOG_QUEUE_CAPACITY`, 默认100)
    pub queue_capacity: usize,

    /// 持久化键 (`SIGMA_LOG_STORAGE_KEY`)
    pub storage_key: String,

    /// 持久化目录 (`SIGMA_LOG_STORAGE_DIR`, 默认 `<data_dir>/sigma`)
    pub storage_dir: Option<PathBuf>,

    /// tracing 文件日志目录 (`SIGMA_LOG_DIR`)
    pub log_dir: Option<PathBuf>,

    /// 来源URL (`SIGMA_CLIENT_URL`)
    pub client_url: Option<String>,

    /// 连通性探测地址 (`SIGMA_HEALTH_URL`)
    pub health_url: Option<String>,

    /// 探测间隔 (`SIGMA_HEALTH_INTERVAL_SECS`)
    pub health_interval_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: dirs::data_dir().map(|p| p.join("sigma")),
            log_dir: None,
            client_url: None,
            health_url: None,
            health_interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
        }
    }
}

impl LogConfig {
    /// 从环境变量加载配置
    ///
    /// 先尝试加载当前目录的 .env,文件不存在不报错
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "已加载 .env 文件"),
            Err(e) if e.not_found() => tracing::debug!(".env 文件不存在,仅使用进程环境变量"),
            Err(e) => return Err(ConfigError::Io(e.to_string())),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意键值查找函数构建配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // 空字符串视为未配置
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let queue_capacity = match get("SIGMA_LOG_QUEUE_CAPACITY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SIGMA_LOG_QUEUE_CAPACITY".to_string(),
                        value: raw,
                    })
                }
            },
            None => defaults.queue_capacity,
        };

        let health_interval_secs = match get("SIGMA_HEALTH_INTERVAL_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SIGMA_HEALTH_INTERVAL_SECS".to_string(),
                        value: raw,
                    })
                }
            },
            None => defaults.health_interval_secs,
        };

        let config = Self {
            endpoint_url: get("SIGMA_LOG_ENDPOINT"),
            queue_capacity,
            storage_key: get("SIGMA_LOG_STORAGE_KEY").unwrap_or(defaults.storage_key),
            storage_dir: get("SIGMA_LOG_STORAGE_DIR")
                .map(PathBuf::from)
                .or(defaults.storage_dir),
            log_dir: get("SIGMA_LOG_DIR").map(PathBuf::from),
            client_url: get("SIGMA_CLIENT_URL"),
            health_url: get("SIGMA_HEALTH_URL"),
            health_interval_secs,
        };

        tracing::info!(
            config = %config.summary_for_logging(),
            "已加载日志投递配置"
        );

        Ok(config)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// 日志用摘要,不含查询参数等可能敏感的URL部分
    pub fn summary_for_logging(&self) -> String {
        let strip = |url: &Option<String>| {
            url.as_deref()
                .map(|u| u.split('?').next().unwrap_or(u).to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        format!(
            "endpoint={} capacity={} key={} health={}/{}s",
            strip(&self.endpoint_url),
            self.queue_capacity,
            self.storage_key,
            strip(&self.health_url),
            self.health_interval_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = LogConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.storage_key, "SIGMA_LOG_QUEUE");
        assert!(config.endpoint_url.is_none());
        assert_eq!(config.health_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_values_are_read() {
        let config = LogConfig::from_lookup(lookup_from(&[
            ("SIGMA_LOG_ENDPOINT", "https://logs.sigma.local/client"),
            ("SIGMA_LOG_QUEUE_CAPACITY", "20"),
            ("SIGMA_LOG_STORAGE_DIR", "/tmp/sigma-test"),
            ("SIGMA_HEALTH_INTERVAL_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(
            config.endpoint_url.as_deref(),
            Some("https://logs.sigma.local/client")
        );
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/sigma-test")));
        assert_eq!(config.health_interval_secs, 5);
    }

    #[test]
    fn test_blank_value_is_unset() {
        let config = LogConfig::from_lookup(lookup_from(&[("SIGMA_LOG_ENDPOINT", "  ")])).unwrap();
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = LogConfig::from_lookup(lookup_from(&[("SIGMA_LOG_QUEUE_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SIGMA_LOG_QUEUE_CAPACITY"));
    }

    #[test]
    fn test_non_numeric_interval_rejected() {
        let err = LogConfig::from_lookup(lookup_from(&[("SIGMA_HEALTH_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_summary_hides_query_string() {
        let mut config = LogConfig::default();
        config.endpoint_url = Some("https://logs.sigma.local/client?token=abc".to_string());

        let summary = config.summary_for_logging();
        assert!(summary.contains("https://logs.sigma.local/client"));
        assert!(!summary.contains("token"));
    }
}
