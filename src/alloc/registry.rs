use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::record::AllocationRecord;

/// レジストリエラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Allocation not found: {0}")]
    NotFound(String),

    #[error("Allocation already exists: {0}")]
    AlreadyExists(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// アロケーションレジストリ
///
/// Process-wide map from path to allocation record, guarded by a single
/// coarse lock. The lock covers only map operations; field mutation and all
/// GPU calls happen under the per-entry lock after the map guard is
/// dropped. Records are handed out as `Arc` clones so a handler that raced
/// with `remove` keeps its record alive until it is done with it.
pub struct AllocationRegistry {
    entries: Mutex<HashMap<String, Arc<AllocationRecord>>>,
}

impl AllocationRegistry {
    /// 空のレジストリを作成
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// パスでレコードを検索
    pub fn lookup(&self, path: &str) -> Option<Arc<AllocationRecord>> {
        self.entries.lock().get(path).cloned()
    }

    /// レコードを登録
    ///
    /// Fails if the path is already present; create-idempotence is decided
    /// one level up, not here.
    pub fn insert(&self, record: Arc<AllocationRecord>) -> RegistryResult<()> {
        let mut entries = self.entries.lock();

        if entries.contains_key(record.path()) {
            return Err(RegistryError::AlreadyExists(record.path().to_string()));
        }

        tracing::debug!(path = record.path(), "registered allocation record");
        entries.insert(record.path().to_string(), record);

        Ok(())
    }

    /// レコードを削除して返す
    ///
    /// The caller releases any GPU memory afterwards, outside this lock.
    pub fn remove(&self, path: &str) -> Option<Arc<AllocationRecord>> {
        let removed = self.entries.lock().remove(path);
        if removed.is_some() {
            tracing::debug!(path, "removed allocation record");
        }
        removed
    }

    /// 全エントリを走査
    ///
    /// The visitor runs under the registry lock and must not re-enter any
    /// registry operation or take an entry lock.
    pub fn iterate<F>(&self, mut visitor: F)
    where
        F: FnMut(&Arc<AllocationRecord>),
    {
        for record in self.entries.lock().values() {
            visitor(record);
        }
    }

    /// 全エントリを取り出してレジストリを空にする
    ///
    /// Used at shutdown so GPU release can run after the lock is dropped.
    pub fn drain(&self) -> Vec<Arc<AllocationRecord>> {
        self.entries.lock().drain().map(|(_, r)| r).collect()
    }

    /// 登録されているレコード数
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for AllocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
