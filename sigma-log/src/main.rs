//! 日志转发程序
//!
//! 从标准输入逐行读取日志并交给投递子系统。
//! 行首可带级别前缀 (`ERROR `、`WARNING `、`INFO `),缺省为 INFO。

use sigma_log::models::{LogConfig, LogLevel};
use sigma_log::services::{ConnectivityMonitor, LogDelivery};
use sigma_log::utils::logger;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 拆出行首级别前缀
fn split_level_prefix(line: &str) -> (LogLevel, &str) {
    let trimmed = line.trim();
    if let Some((head, rest)) = trimmed.split_once(char::is_whitespace) {
        if let Ok(level) = head.trim_matches(|c: char| c == '[' || c == ']' || c == ':').parse() {
            return (level, rest.trim_start());
        }
    }
    (LogLevel::Info, trimmed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LogConfig::from_env()?;

    // guard 必须持有到退出
    let _guard = logger::init(config.log_dir.as_deref())?;
    tracing::info!(config = %config.summary_for_logging(), "SIGMA 日志转发启动");

    let delivery = LogDelivery::from_config(&config);
    let cancel = CancellationToken::new();

    let signals = config.health_url.as_ref().map(|url| {
        let (tx, rx) = mpsc::channel(8);
        ConnectivityMonitor::spawn(url.clone(), config.health_interval(), tx, cancel.clone());
        rx
    });

    delivery.initialize(signals).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("收到退出信号");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let (level, message) = split_level_prefix(&line);
                    if !message.is_empty() {
                        delivery.record(level, message, None);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    delivery.error_with("读取标准输入失败", &e);
                    break;
                }
            },
        }
    }

    cancel.cancel();
    delivery.shutdown().await;

    Ok(())
}
