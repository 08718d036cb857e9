use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// 控制台层即客户端日志的本地输出,始终启用:
/// - 人类可读格式,写到 stderr (stdout 留给转发程序)
/// - 环境变量控制: RUST_LOG=debug 可调整日志级别,默认 INFO
///
/// 指定 `log_dir` 时额外启用文件层:
/// - JSON格式: 便于日志分析工具解析
/// - 按天轮转: 文件命名 sigma-log.2025-10-05.log
/// - non_blocking: 避免文件I/O阻塞调用方
///
/// # 重要提示
/// 返回的guard必须被调用者保存,直到应用退出。
/// 如果guard被drop,文件写入器将被关闭。
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("sigma-log")
                .filename_suffix("log")
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false);

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info, warn};

    #[test]
    fn test_logger_initialization_with_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let guard = init(Some(&log_dir)).unwrap();
        assert!(guard.is_some());
        assert!(log_dir.exists());

        info!("日志系统测试: INFO级别");
        warn!("日志系统测试: WARN级别");
        error!(条目ID = "test-entry", "日志系统测试: ERROR级别");

        // 全局订阅器只能设置一次
        assert!(init(None).is_err());
    }
}
