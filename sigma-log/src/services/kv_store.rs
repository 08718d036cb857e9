//! 持久化键值存储
//!
//! 浏览器 localStorage 的替代: 同步 `get/set/remove`,失败返回错误由调用方吞掉。
//! - `FileStore`: 每个键一个JSON文件
//! - `MemoryStore`: 进程内存,可设置配额模拟存储已满
//! - `NoopStore`: 非交互环境,什么都不存

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::StorageError;

/// 同步键值存储
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// 文件存储
///
/// 键 `SIGMA_LOG_QUEUE` 对应文件 `<dir>/SIGMA_LOG_QUEUE.json`。
/// 写入先落临时文件再重命名,避免进程中断留下半截JSON。
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // 键只保留文件名安全字符
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    /// 单个值的字节上限
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置单值字节上限 (构建器模式)
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota = Some(limit);
        self
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.quota {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    limit,
                });
            }
        }
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values().remove(key);
        Ok(())
    }
}

/// 空存储
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl KeyValueStore for NoopStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.dir(), dir.path().join("nested"));

        assert_eq!(store.get("SIGMA_LOG_QUEUE").unwrap(), None);

        store.set("SIGMA_LOG_QUEUE", "[]").unwrap();
        assert_eq!(store.get("SIGMA_LOG_QUEUE").unwrap().as_deref(), Some("[]"));
        assert!(dir.path().join("nested/SIGMA_LOG_QUEUE.json").exists());

        store.remove("SIGMA_LOG_QUEUE").unwrap();
        assert_eq!(store.get("SIGMA_LOG_QUEUE").unwrap(), None);
        // 重复删除不报错
        store.remove("SIGMA_LOG_QUEUE").unwrap();
    }

    #[test]
    fn test_file_store_sanitizes_key() {
        let store = FileStore::new("/var/lib/sigma");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/var/lib/sigma/___etc_passwd.json")
        );
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::new().with_quota(4);

        store.set("k", "1234").unwrap();
        let err = store.set("k", "12345").unwrap_err();

        assert!(matches!(err, StorageError::QuotaExceeded { limit: 4, .. }));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("1234"));
    }

    #[test]
    fn test_noop_store_never_returns_values() {
        let store = NoopStore;
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
