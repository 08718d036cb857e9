//! 有界日志队列
//!
//! FIFO,容量固定,超出时丢弃最旧条目。

use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

use crate::models::LogEntry;

/// 有界FIFO日志队列
///
/// 不变量: `len() <= capacity()`
#[derive(Debug, Clone)]
pub struct LogQueue {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogQueue {
    /// 创建空队列
    ///
    /// 容量为0时按1处理
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 追加到队尾,满时先淘汰队首
    ///
    /// 返回被淘汰的条目
    pub fn push_back(&mut self, entry: LogEntry) -> Option<LogEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// 放回队首 (投递失败的条目重新排在最前)
    ///
    /// 满时淘汰的仍是最旧条目,即刚放回的这一条
    pub fn push_front(&mut self, entry: LogEntry) -> Option<LogEntry> {
        if self.entries.len() >= self.capacity {
            return Some(entry);
        }
        self.entries.push_front(entry);
        None
    }

    pub fn pop_front(&mut self) -> Option<LogEntry> {
        self.entries.pop_front()
    }

    /// 合并外部条目,按 `id` 去重
    ///
    /// 返回 (新增数量, 被淘汰数量)
    pub fn merge<I>(&mut self, incoming: I) -> (usize, usize)
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let mut known: HashSet<Uuid> = self.entries.iter().map(LogEntry::dedup_key).collect();
        let mut added = 0;
        let mut evicted = 0;

        for entry in incoming {
            if !known.insert(entry.dedup_key()) {
                continue;
            }
            if self.push_back(entry).is_some() {
                evicted += 1;
            }
            added += 1;
        }

        (added, evicted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// 序列化整个队列 (持久化格式: JSON数组)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }
}
