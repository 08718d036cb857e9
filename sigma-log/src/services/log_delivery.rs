//! 日志投递服务
//!
//! 职责: 连通性短暂丢失时不丢日志,不阻塞调用方,内存占用有上限。
//!
//! ```text
//! record ──► 控制台 (tracing)
//!    │
//!    ├─ 在线 ──► 后台投递 ──成功──► 完成
//!    │                 └──失败──► 标记离线, 入队
//!    └─ 离线 ──► 入队 ──► 持久化快照
//!
//! 恢复在线 ──► process_pending: 合并持久化队列 → 按FIFO逐条投递, 首次失败即停止
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::models::{
    ErrorPayload, LogConfig, LogEntry, LogLevel, LogOrigin, StorageError,
};
use crate::services::connectivity::ConnectivitySignal;
use crate::services::kv_store::{FileStore, KeyValueStore, NoopStore};
use crate::services::log_endpoint::{HttpEndpoint, LogEndpoint, NoopEndpoint};
use crate::services::log_queue::LogQueue;

/// 投递失败的条目放回队列的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requeue {
    /// `record` 路径: 追加到队尾
    Back,
    /// 重放路径: 放回队首,保持剩余条目顺序
    Front,
}

/// 单次投递结果,只在管线内部使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Delivered { reconnected: bool },
    Failed,
    Buffered,
}

/// 队列与连通性标志,同一把锁保护
struct DeliveryState {
    queue: LogQueue,
    connected: bool,
}

struct Inner {
    endpoint: Arc<dyn LogEndpoint>,
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    origin: LogOrigin,
    state: Mutex<DeliveryState>,
    /// 串行化重放
    drain_lock: tokio::sync::Mutex<()>,
    /// 后台投递任务
    tasks: TaskTracker,
    /// 当前监听任务的取消令牌,`shutdown` 之后重新初始化时替换
    cancel: Mutex<CancellationToken>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// 日志投递子系统
///
/// 启动时创建一次,克隆后注入到所有需要记录日志的地方。
/// 克隆共享同一个队列和连通性标志。
#[derive(Clone)]
pub struct LogDelivery {
    inner: Arc<Inner>,
}

impl LogDelivery {
    /// 创建投递子系统
    ///
    /// # 参数
    /// - `config`: 提供队列容量、持久化键和来源URL
    /// - `endpoint`: 远端端点,非交互环境传 `NoopEndpoint`
    /// - `store`: 持久化存储,非交互环境传 `NoopStore`
    pub fn new(
        config: &LogConfig,
        endpoint: Arc<dyn LogEndpoint>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        tracing::info!(
            容量 = config.queue_capacity,
            持久化键 = %config.storage_key,
            远端投递 = endpoint.is_remote(),
            "日志投递子系统已创建"
        );

        Self {
            inner: Arc::new(Inner {
                endpoint,
                store,
                storage_key: config.storage_key.clone(),
                origin: LogOrigin::for_this_client(config.client_url.clone()),
                state: Mutex::new(DeliveryState {
                    queue: LogQueue::new(config.queue_capacity),
                    connected: true,
                }),
                drain_lock: tokio::sync::Mutex::new(()),
                tasks: TaskTracker::new(),
                cancel: Mutex::new(CancellationToken::new()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// 按配置选择端点与存储
    ///
    /// - 配置了 `endpoint_url`: HTTP端点,否则空端点
    /// - 配置了 `storage_dir`: 文件存储,否则空存储
    pub fn from_config(config: &LogConfig) -> Self {
        let endpoint: Arc<dyn LogEndpoint> = match &config.endpoint_url {
            Some(url) => Arc::new(HttpEndpoint::new(url.clone())),
            None => Arc::new(NoopEndpoint),
        };
        let store: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(NoopStore),
        };
        Self::new(config, endpoint, store)
    }

    /// 用指定来源覆盖默认来源 (构建器模式)
    ///
    /// 只能在克隆分发之前调用
    pub fn with_origin(self, origin: LogOrigin) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.origin = origin;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                tracing::warn!("投递子系统已被共享,忽略来源覆盖");
                Self { inner }
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, DeliveryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // 公开入口
    // ========================================================================

    /// 记录一条日志
    ///
    /// 同步输出到控制台;存在远端时交给投递管线。
    /// 不返回结果,也不会失败。
    pub fn record(&self, level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) {
        let entry = LogEntry::new(level, message, data, self.inner.origin.clone());
        emit_console(&entry);

        if !self.inner.endpoint.is_remote() {
            return;
        }

        // 离线时同步入队,不经过后台任务
        let entry = {
            let mut state = self.state();
            if !state.connected {
                self.push_locked(&mut state, entry, Requeue::Back);
                return;
            }
            entry
        };

        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!(条目ID = %entry.id, "当前线程没有异步运行时,日志暂存队列");
            let mut state = self.state();
            self.push_locked(&mut state, entry, Requeue::Back);
            return;
        }

        let this = self.clone();
        self.inner.tasks.spawn(async move {
            this.deliver(entry).await;
        });
    }

    pub fn info(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.record(LogLevel::Info, message, data);
    }

    pub fn warning(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.record(LogLevel::Warning, message, data);
    }

    pub fn error(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.record(LogLevel::Error, message, data);
    }

    /// 记录携带错误对象的ERROR日志
    ///
    /// 错误规范化为 `{name, message, stack}`
    pub fn error_with<E>(&self, message: impl Into<String>, err: &E)
    where
        E: std::error::Error + ?Sized + 'static,
    {
        let payload = ErrorPayload::from_error(err).into_value();
        self.record(LogLevel::Error, message, Some(payload));
    }

    /// 初始化
    ///
    /// 1. 合并持久化队列并尝试重放
    /// 2. 订阅连通性信号 (传入 `None` 则不订阅)
    /// 3. 记录初始化完成
    ///
    /// `shutdown` 之后可以再次调用,监听任务使用新的取消令牌
    pub async fn initialize(&self, signals: Option<mpsc::Receiver<ConnectivitySignal>>) {
        self.process_pending().await;

        if let Some(rx) = signals {
            let cancel = {
                let mut cancel = self
                    .inner
                    .cancel
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if cancel.is_cancelled() {
                    *cancel = CancellationToken::new();
                }
                cancel.clone()
            };
            let handle = self.spawn_listener(rx, cancel);
            let previous = self
                .inner
                .listener
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .replace(handle);
            if let Some(previous) = previous {
                previous.abort();
            }
        }

        self.info("日志系统已初始化", None);
    }

    /// 处理一个连通性信号
    ///
    /// - `Online`: 标记在线并重放
    /// - `Offline`: 标记离线,不重放
    pub async fn handle_signal(&self, signal: ConnectivitySignal) {
        if self.apply_signal(signal) {
            self.process_pending().await;
        }
    }

    /// 显式修改连通性标志,离线→在线时触发重放
    pub async fn set_connected(&self, connected: bool) {
        let was_connected = std::mem::replace(&mut self.state().connected, connected);
        tracing::debug!(之前 = was_connected, 之后 = connected, "连通性标志已修改");

        if connected && !was_connected {
            self.process_pending().await;
        }
    }

    /// 等待所有后台投递完成
    pub async fn flush(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// 停止信号监听并等待后台投递完成
    ///
    /// 未送达的条目已在持久化存储中,下次启动时重放
    pub async fn shutdown(&self) {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();

        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                tracing::warn!(错误 = %e, "连通性监听任务异常结束");
            }
        }

        self.flush().await;

        tracing::info!(
            剩余条目 = self.queue_len(),
            "日志投递子系统已关闭"
        );
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn queue_len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.state().queue.capacity()
    }

    /// 当前队列快照 (从旧到新)
    pub fn queued_entries(&self) -> Vec<LogEntry> {
        self.state().queue.to_vec()
    }

    // ========================================================================
    // 投递管线
    // ========================================================================

    /// 投递单条日志
    ///
    /// 失败时转入本地缓存;投递成功且此前被标记为离线时触发重放。
    pub async fn deliver(&self, entry: LogEntry) {
        if let Attempt::Delivered { reconnected: true } = self.attempt(entry, Requeue::Back).await {
            tracing::info!("日志端点恢复可用,开始重放");
            self.process_pending().await;
        }
    }

    async fn attempt(&self, entry: LogEntry, requeue: Requeue) -> Attempt {
        {
            let mut state = self.state();
            if !state.connected {
                self.push_locked(&mut state, entry, requeue);
                return Attempt::Buffered;
            }
        }

        match self.inner.endpoint.send(&entry).await {
            Ok(()) => {
                let was_connected = std::mem::replace(&mut self.state().connected, true);
                Attempt::Delivered {
                    reconnected: !was_connected,
                }
            }
            Err(e) => {
                tracing::error!(
                    条目ID = %entry.id,
                    级别 = %entry.level,
                    错误 = %e,
                    "日志投递失败,转入本地缓存"
                );
                let mut state = self.state();
                state.connected = false;
                self.push_locked(&mut state, entry, requeue);
                Attempt::Failed
            }
        }
    }

    /// 重放待发送日志
    ///
    /// 先合并持久化队列并清空持久化槽,再按FIFO逐条投递。
    /// 每次投递后重新检查连通性,首次失败即停止,失败条目放回队首。
    /// 队列在投递期间被并发写满时,放回的条目是最旧的一条,按容量上限被丢弃。
    /// 结束时队列非空则整体写回持久化槽。
    pub async fn process_pending(&self) {
        let _drain = self.inner.drain_lock.lock().await;

        self.reconcile_persisted();

        let mut delivered = 0usize;
        loop {
            let entry = {
                let mut state = self.state();
                if !state.connected {
                    break;
                }
                match state.queue.pop_front() {
                    Some(entry) => entry,
                    None => break,
                }
            };

            match self.attempt(entry, Requeue::Front).await {
                Attempt::Delivered { .. } => delivered += 1,
                Attempt::Failed | Attempt::Buffered => break,
            }
        }

        let state = self.state();
        if !state.queue.is_empty() {
            self.persist_locked(&state.queue);
        }
        if delivered > 0 || !state.queue.is_empty() {
            tracing::info!(
                已重放 = delivered,
                剩余 = state.queue.len(),
                在线 = state.connected,
                "待发送日志重放结束"
            );
        }
    }

    /// 合并持久化队列到内存并清空持久化槽
    ///
    /// 损坏的持久化数据直接丢弃
    fn reconcile_persisted(&self) {
        let key = &self.inner.storage_key;

        let raw = match self.inner.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(持久化键 = %key, 错误 = %e, "读取持久化日志失败");
                return;
            }
        };

        match serde_json::from_str::<Vec<LogEntry>>(&raw).map_err(StorageError::from) {
            Ok(persisted) => {
                let total = persisted.len();
                let mut state = self.state();
                let (added, evicted) = state.queue.merge(persisted);
                tracing::info!(
                    持久化条目 = total,
                    新增 = added,
                    淘汰 = evicted,
                    队列长度 = state.queue.len(),
                    "已合并持久化日志"
                );
            }
            Err(e) => {
                tracing::warn!(
                    持久化键 = %key,
                    错误 = %e,
                    "持久化日志已损坏,丢弃"
                );
            }
        }

        if let Err(e) = self.inner.store.remove(key) {
            tracing::error!(持久化键 = %key, 错误 = %e, "清除持久化日志失败");
        }
    }

    /// 入队并持久化,调用方持有状态锁
    fn push_locked(&self, state: &mut DeliveryState, entry: LogEntry, requeue: Requeue) {
        let evicted = match requeue {
            Requeue::Back => state.queue.push_back(entry),
            Requeue::Front => state.queue.push_front(entry),
        };

        if let Some(evicted) = evicted {
            tracing::warn!(
                条目ID = %evicted.id,
                容量 = state.queue.capacity(),
                "日志队列已满,丢弃最旧条目"
            );
        }

        self.persist_locked(&state.queue);
    }

    /// 整个队列写入持久化槽,失败只记录不上抛
    fn persist_locked(&self, queue: &LogQueue) {
        let result = queue
            .to_json()
            .map_err(StorageError::from)
            .and_then(|json| self.inner.store.set(&self.inner.storage_key, &json));

        if let Err(e) = result {
            tracing::error!(
                持久化键 = %self.inner.storage_key,
                队列长度 = queue.len(),
                错误 = %e,
                "存储待发送日志失败"
            );
        }
    }

    // ========================================================================
    // 连通性信号
    // ========================================================================

    /// 修改标志,返回是否需要重放
    fn apply_signal(&self, signal: ConnectivitySignal) -> bool {
        let mut state = self.state();
        match signal {
            ConnectivitySignal::Online => {
                state.connected = true;
                true
            }
            ConnectivitySignal::Offline => {
                state.connected = false;
                false
            }
        }
    }

    fn spawn_listener(
        &self,
        mut rx: mpsc::Receiver<ConnectivitySignal>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = rx.recv() => signal,
                };
                let Some(signal) = signal else {
                    break;
                };

                tracing::info!(信号 = ?signal, "收到连通性信号");

                // 标志立即生效,重放放到后台以免阻塞后续信号
                if this.apply_signal(signal) {
                    let drainer = this.clone();
                    this.inner.tasks.spawn(async move {
                        drainer.process_pending().await;
                    });
                }
            }
            tracing::debug!("连通性信号监听已停止");
        })
    }
}

/// 控制台输出
fn emit_console(entry: &LogEntry) {
    match entry.level {
        LogLevel::Error => {
            tracing::error!(
                来源 = "client",
                消息 = %entry.message,
                附加数据 = ?entry.data,
                url = ?entry.origin.url,
                "[ERROR] {}",
                entry.message
            );
        }
        LogLevel::Warning => {
            tracing::warn!(
                来源 = "client",
                消息 = %entry.message,
                附加数据 = ?entry.data,
                "[WARNING] {}",
                entry.message
            );
        }
        LogLevel::Info => {
            tracing::info!(
                来源 = "client",
                消息 = %entry.message,
                附加数据 = ?entry.data,
                "[INFO] {}",
                entry.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kv_store::MemoryStore;

    fn offline_only() -> LogDelivery {
        LogDelivery::new(
            &LogConfig::default(),
            Arc::new(NoopEndpoint),
            Arc::new(MemoryStore::new()),
        )
    }

    #[test]
    fn test_record_without_remote_never_queues() {
        let delivery = offline_only();
        delivery.info("仅控制台", None);
        delivery.error("仅控制台", Some(serde_json::json!({"code": 1})));
        assert_eq!(delivery.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_signals_toggle_flag() {
        let delivery = offline_only();
        assert!(delivery.is_connected());

        delivery.handle_signal(ConnectivitySignal::Offline).await;
        assert!(!delivery.is_connected());

        delivery.handle_signal(ConnectivitySignal::Online).await;
        assert!(delivery.is_connected());
    }

    #[test]
    fn test_with_origin_before_sharing() {
        let origin = LogOrigin::new(Some("https://sigma.local/".to_string()), None);
        let delivery = offline_only().with_origin(origin.clone());
        assert_eq!(delivery.inner.origin, origin);
    }
}
