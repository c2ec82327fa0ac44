//! Allocation lifecycle operations.
//!
//! [`GpuMemFs`] is the handler core invoked by the FUSE adapter. Each
//! operation looks its record up through the registry (global lock, held
//! only for the map access), then works under the record's own lock. GPU
//! allocation and release always happen under the entry lock and never
//! under the registry lock, so operations on distinct paths proceed in
//! parallel while operations on one path serialize.
//!
//! State machine per path:
//!
//! ```text
//!    (absent) --create--> (unmaterialized) --truncate(n>0)--> (materialized)
//!         ^                   |                                    |
//!         |                   +--truncate(0)-----------------------+
//!         +-----------------unlink---------------------------------+
//! ```

use std::sync::Arc;

use crate::alloc::{now_epoch, AllocationRecord, AllocationRegistry};
use crate::constants::{DIR_MODE, FILE_MODE, MAX_PATH_LEN, ROOT_NLINK};
use crate::gpu::{GpuBinding, FABRIC_HANDLE_SIZE};

use super::error::{FsError, FsResult};
use super::{FileKind, FileStat};

/// タイムスタンプ更新指定
#[derive(Debug, Clone, Copy)]
pub enum TimeSet {
    /// 現在時刻に設定
    Now,
    /// エポック秒で指定
    Epoch(i64),
}

impl TimeSet {
    fn resolve(self) -> i64 {
        match self {
            TimeSet::Now => now_epoch(),
            TimeSet::Epoch(secs) => secs,
        }
    }
}

/// GPUメモリファイルシステムコア
///
/// Owns the path-keyed registry and delegates device effects to the GPU
/// binding. All operations take `&self`; the struct is shared across
/// dispatcher threads behind an `Arc`.
pub struct GpuMemFs {
    registry: AllocationRegistry,
    gpu: Arc<dyn GpuBinding>,
}

impl GpuMemFs {
    /// 新しいファイルシステムコアを作成
    pub fn new(gpu: Arc<dyn GpuBinding>) -> Self {
        Self {
            registry: AllocationRegistry::new(),
            gpu,
        }
    }

    pub(crate) fn lookup_record(&self, path: &str) -> FsResult<Arc<AllocationRecord>> {
        self.registry
            .lookup(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn validate_path(path: &str) -> FsResult<()> {
        if !path.starts_with('/') || path.len() < 2 {
            return Err(FsError::InvalidArgument(format!(
                "path must name an entry under the root: {:?}",
                path
            )));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(FsError::InvalidArgument(format!(
                "path exceeds {} bytes",
                MAX_PATH_LEN
            )));
        }
        if path[1..].contains('/') {
            return Err(FsError::InvalidArgument(format!(
                "subdirectories are not supported: {:?}",
                path
            )));
        }
        if path.as_bytes().contains(&0) {
            return Err(FsError::InvalidArgument("path contains NUL".to_string()));
        }
        Ok(())
    }

    /// エントリを作成
    ///
    /// Idempotent: creating an existing path succeeds and only refreshes
    /// its access time. No GPU memory is touched here.
    pub fn create(&self, path: &str) -> FsResult<()> {
        Self::validate_path(path)?;

        if let Some(existing) = self.registry.lookup(path) {
            existing.lock().touch_atime();
            tracing::debug!(path, "create on existing entry");
            return Ok(());
        }

        let record = Arc::new(AllocationRecord::new(path.to_string()));
        match self.registry.insert(record) {
            Ok(()) => {
                tracing::info!(path, "created allocation entry");
                Ok(())
            }
            // Lost a create/create race; the other entry wins and this
            // call is still a success.
            Err(_) => Ok(()),
        }
    }

    /// サイズ変更 (実体化・解放)
    ///
    /// - `size > 0` on an unmaterialized entry allocates device memory and
    ///   exports the fabric handle.
    /// - `size == 0` on a materialized entry releases the memory and keeps
    ///   the registry entry.
    /// - Any other size change is a resize, which is not supported.
    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let record = self.lookup_record(path)?;
        let mut state = record.lock();

        if size == 0 {
            match state.gpu().map(|alloc| alloc.handle) {
                Some(handle) => {
                    // Release first: a driver failure must leave the
                    // record untouched.
                    self.gpu
                        .release(handle)
                        .map_err(|e| FsError::Io(e.to_string()))?;
                    state.clear();
                    tracing::info!(path, "released allocation (truncate to 0)");
                }
                None => state.touch_mtime(),
            }
            return Ok(());
        }

        if state.is_materialized() {
            if state.size() == size {
                return Ok(());
            }
            return Err(FsError::NotSupported(format!(
                "resize not supported: {} has {} bytes, requested {}",
                path,
                state.size(),
                size
            )));
        }

        let allocation = self
            .gpu
            .allocate(size)
            .map_err(|e| FsError::OutOfMemory(e.to_string()))?;
        state.materialize(size, allocation);
        tracing::info!(path, size, "materialized allocation");

        Ok(())
    }

    /// エントリを削除
    ///
    /// Removes the entry under the registry lock, then releases any device
    /// memory outside it. Handlers that raced with the removal keep the
    /// record alive through their own `Arc` until they finish.
    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let record = self
            .registry
            .remove(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let released = record.lock().clear();
        if let Some(alloc) = released {
            if let Err(e) = self.gpu.release(alloc.handle) {
                tracing::warn!(path, error = %e, "GPU release failed during unlink");
                return Err(FsError::Io(e.to_string()));
            }
        }

        tracing::info!(path, "unlinked allocation entry");
        Ok(())
    }

    /// オープン
    ///
    /// Existence check only; no per-open state is kept.
    pub fn open(&self, path: &str) -> FsResult<()> {
        self.lookup_record(path).map(|_| ())
    }

    /// 診断用リード
    ///
    /// Returns the raw fabric handle at offset 0. The canonical retrieval
    /// path is the `user.fabric_handle` attribute; this exists so
    /// `cat`-style tooling can grab the token.
    pub fn read(&self, path: &str, size: usize, offset: i64) -> FsResult<Vec<u8>> {
        let record = self.lookup_record(path)?;
        let state = record.lock();

        let Some(alloc) = state.gpu() else {
            return Err(FsError::NoData(path.to_string()));
        };

        if offset != 0 {
            // Only the handle itself is readable; anything past it is EOF
            return Ok(Vec::new());
        }
        if size < FABRIC_HANDLE_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "buffer of {} bytes cannot hold a {}-byte fabric handle",
                size, FABRIC_HANDLE_SIZE
            )));
        }

        Ok(alloc.fabric.as_bytes().to_vec())
    }

    /// タイムスタンプ更新
    ///
    /// `None` in a slot leaves that timestamp unchanged.
    pub fn utimens(
        &self,
        path: &str,
        atime: Option<TimeSet>,
        mtime: Option<TimeSet>,
    ) -> FsResult<()> {
        let record = self.lookup_record(path)?;
        let mut state = record.lock();

        if let Some(t) = atime {
            state.atime = t.resolve();
        }
        if let Some(t) = mtime {
            state.mtime = t.resolve();
        }

        Ok(())
    }

    /// 属性取得
    pub fn getattr(&self, path: &str) -> FsResult<FileStat> {
        if path == "/" {
            let now = now_epoch();
            return Ok(FileStat {
                kind: FileKind::Directory,
                size: 0,
                mode: DIR_MODE,
                nlink: ROOT_NLINK,
                uid: 0,
                gid: 0,
                atime: now,
                mtime: now,
                ctime: now,
            });
        }

        let record = self.lookup_record(path)?;
        let state = record.lock();

        Ok(FileStat {
            kind: FileKind::Regular,
            size: state.size(),
            mode: FILE_MODE,
            nlink: 1,
            uid: 0,
            gid: 0,
            atime: state.atime,
            mtime: state.mtime,
            ctime: record.created(),
        })
    }

    /// ルートディレクトリの一覧
    ///
    /// Entry names without the leading slash, in registry iteration order.
    /// The snapshot is consistent with a single acquisition of the
    /// registry lock.
    pub fn readdir(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.registry
            .iterate(|record| names.push(record.path()[1..].to_string()));
        names
    }

    /// 登録されているエントリ数
    pub fn entry_count(&self) -> usize {
        self.registry.len()
    }

    /// 全アロケーションを解放して終了
    ///
    /// Drains the registry first so no GPU call runs under the registry
    /// lock, then releases every materialized allocation. Driver failures
    /// are logged and skipped; shutdown always completes.
    pub fn shutdown(&self) {
        let records = self.registry.drain();
        let mut released = 0usize;

        for record in records {
            if let Some(alloc) = record.lock().clear() {
                match self.gpu.release(alloc.handle) {
                    Ok(()) => released += 1,
                    Err(e) => {
                        tracing::warn!(path = record.path(), error = %e, "GPU release failed during shutdown")
                    }
                }
            }
        }

        tracing::info!(released, "filesystem shut down");
    }
}
