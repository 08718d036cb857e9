//! 测试公共模块
//!
//! 提供假端点和构建工具,避免依赖真实网络。

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use sigma_log::models::{DeliveryError, LogConfig, LogEntry, LogLevel, LogOrigin};
use sigma_log::services::{KeyValueStore, LogDelivery, LogEndpoint};

/// 可编排失败的假端点
///
/// - 记录每条成功送达的日志
/// - `fail_always`: 所有调用失败
/// - `fail_on_call`: 第 n 次调用失败 (从1开始计数)
#[derive(Default)]
pub struct FakeEndpoint {
    delivered: Mutex<Vec<LogEntry>>,
    calls: AtomicUsize,
    fail_always: AtomicBool,
    fail_on: Mutex<HashSet<usize>>,
}

impl FakeEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let endpoint = Self::default();
        endpoint.fail_always.store(true, Ordering::SeqCst);
        Arc::new(endpoint)
    }

    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    pub fn fail_on_call(&self, n: usize) {
        self.fail_on.lock().unwrap().insert(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<LogEntry> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_messages(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

#[async_trait]
impl LogEndpoint for FakeEndpoint {
    async fn send(&self, entry: &LogEntry) -> Result<(), DeliveryError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_always.load(Ordering::SeqCst) || self.fail_on.lock().unwrap().contains(&n) {
            return Err(DeliveryError::Network("模拟网络故障".to_string()));
        }

        self.delivered.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// 第一次调用会挂起的假端点
///
/// 调用进入 `send` 时通知 `entered`,等到 `release` 后再交给内部假端点。
/// 用于让一条投递停在途中,期间修改连通性标志。
pub struct GatedEndpoint {
    pub fake: Arc<FakeEndpoint>,
    gate_first: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl GatedEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fake: FakeEndpoint::new(),
            gate_first: AtomicBool::new(true),
            entered: Notify::new(),
            released: Notify::new(),
        })
    }

    /// 等待第一条投递进入端点
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// 放行挂起的投递
    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl LogEndpoint for GatedEndpoint {
    async fn send(&self, entry: &LogEntry) -> Result<(), DeliveryError> {
        if self.gate_first.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        self.fake.send(entry).await
    }
}

/// 默认持久化键
pub const KEY: &str = "SIGMA_LOG_QUEUE";

/// 指定容量的配置
pub fn config_with_capacity(capacity: usize) -> LogConfig {
    LogConfig {
        queue_capacity: capacity,
        storage_dir: None,
        ..LogConfig::default()
    }
}

/// 用假端点和给定存储构建投递子系统
pub fn delivery_with(
    endpoint: Arc<dyn LogEndpoint>,
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
) -> LogDelivery {
    LogDelivery::new(&config_with_capacity(capacity), endpoint, store)
}

/// 构造一条日志条目
pub fn entry(message: &str) -> LogEntry {
    LogEntry::new(LogLevel::Info, message, None, LogOrigin::default())
}

/// 读取持久化槽中的条目消息
pub fn persisted_messages(store: &dyn KeyValueStore) -> Option<Vec<String>> {
    store.get(KEY).unwrap().map(|raw| {
        serde_json::from_str::<Vec<LogEntry>>(&raw)
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect()
    })
}

pub fn messages(entries: &[LogEntry]) -> Vec<String> {
    entries.iter().map(|e| e.message.clone()).collect()
}
