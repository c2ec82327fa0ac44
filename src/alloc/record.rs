use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};

use crate::gpu::GpuAllocation;

/// 現在時刻 (エポック秒)
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// レコードの可変状態
///
/// `size > 0` と `gpu.is_some()` は常に一致する。The two fields only ever
/// change together through [`RecordState::materialize`] and
/// [`RecordState::clear`], both called with the entry lock held.
#[derive(Debug)]
pub struct RecordState {
    /// 割り当てサイズ (バイト)。0 は未実体化
    size: u64,

    /// GPU割り当て (ハンドルと共有トークン)
    gpu: Option<GpuAllocation>,

    /// 最終アクセス時刻
    pub atime: i64,

    /// 最終更新時刻
    pub mtime: i64,
}

impl RecordState {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn gpu(&self) -> Option<&GpuAllocation> {
        self.gpu.as_ref()
    }

    pub fn is_materialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Bind a fresh device allocation to this record.
    pub fn materialize(&mut self, size: u64, allocation: GpuAllocation) {
        debug_assert!(self.gpu.is_none());
        self.size = size;
        self.gpu = Some(allocation);
        self.mtime = now_epoch();
    }

    /// Return the record to the unmaterialized state.
    ///
    /// Hands the previous allocation back to the caller, which is
    /// responsible for releasing it through the GPU binding.
    pub fn clear(&mut self) -> Option<GpuAllocation> {
        self.size = 0;
        self.mtime = now_epoch();
        self.gpu.take()
    }

    pub fn touch_mtime(&mut self) {
        self.mtime = now_epoch();
    }

    pub fn touch_atime(&mut self) {
        self.atime = now_epoch();
    }
}

/// アロケーションレコード
///
/// One named GPU buffer. The path is immutable after insertion into the
/// registry; everything else lives behind the per-entry lock.
#[derive(Debug)]
pub struct AllocationRecord {
    path: String,
    created: i64,
    state: Mutex<RecordState>,
}

impl AllocationRecord {
    /// 新しい未実体化レコードを作成
    pub fn new(path: String) -> Self {
        let now = now_epoch();
        Self {
            path,
            created: now,
            state: Mutex::new(RecordState {
                size: 0,
                gpu: None,
                atime: now,
                mtime: now,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    /// Acquire the per-entry lock.
    ///
    /// Callers must not attempt any registry operation while holding the
    /// guard; the registry lock is always taken first.
    pub fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock()
    }
}
