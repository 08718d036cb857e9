//! 连通性信号
//!
//! 浏览器 `online`/`offline` 事件的替代: 定时探测健康检查地址,
//! 状态翻转时发出一次信号 (边沿触发)。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 连通性变化信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivitySignal {
    Online,
    Offline,
}

impl ConnectivitySignal {
    /// 根据前后两次探测结果计算信号,状态未变返回 `None`
    pub fn transition(was_online: bool, is_online: bool) -> Option<Self> {
        match (was_online, is_online) {
            (false, true) => Some(ConnectivitySignal::Online),
            (true, false) => Some(ConnectivitySignal::Offline),
            _ => None,
        }
    }
}

/// 连通性监视器
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// 启动后台探测任务
    ///
    /// # 参数
    /// - `probe_url`: 健康检查地址,收到任何HTTP响应即视为在线
    /// - `interval`: 探测间隔,同时作为单次探测的超时
    /// - `sender`: 信号发送端,接收端关闭后任务退出
    /// - `cancel`: 取消令牌
    ///
    /// 初始状态视为在线,与投递子系统的初始连通性一致
    pub fn spawn(
        probe_url: String,
        interval: Duration,
        sender: mpsc::Sender<ConnectivitySignal>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut online = true;

            tracing::info!(
                探测地址 = %probe_url,
                间隔秒 = interval.as_secs(),
                "连通性监视器已启动"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let now_online = Self::probe(&client, &probe_url, interval).await;
                let Some(signal) = ConnectivitySignal::transition(online, now_online) else {
                    continue;
                };
                online = now_online;

                tracing::info!(信号 = ?signal, "连通性发生变化");
                if sender.send(signal).await.is_err() {
                    tracing::debug!("信号接收端已关闭,监视器退出");
                    break;
                }
            }

            tracing::info!("连通性监视器已停止");
        })
    }

    /// 单次探测
    pub async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
        match client.get(url).timeout(timeout).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(探测地址 = %url, 错误 = %e, "连通性探测失败");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_transition_is_edge_triggered() {
        assert_eq!(ConnectivitySignal::transition(true, true), None);
        assert_eq!(ConnectivitySignal::transition(false, false), None);
        assert_eq!(
            ConnectivitySignal::transition(true, false),
            Some(ConnectivitySignal::Offline)
        );
        assert_eq!(
            ConnectivitySignal::transition(false, true),
            Some(ConnectivitySignal::Online)
        );
    }

    #[tokio::test]
    async fn test_monitor_reports_offline_once_for_unreachable_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = ConnectivityMonitor::spawn(
            format!("http://{}/health", addr),
            Duration::from_millis(20),
            tx,
            cancel.clone(),
        );

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(signal, Some(ConnectivitySignal::Offline));

        // 持续离线不会重复发出信号
        let again = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(again.is_err());

        cancel.cancel();
        handle.await.unwrap();
    }
}
