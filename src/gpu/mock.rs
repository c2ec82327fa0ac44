//! In-memory GPU binding for tests.
//!
//! Produces deterministic handles and fabric tokens without touching any
//! driver, and can inject allocation failures to exercise error paths.
//! This mirrors how the storage layer pairs its real backend with an
//! in-memory twin.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{FabricHandle, GpuAllocation, GpuBinding, GpuError, GpuResult, FABRIC_HANDLE_SIZE};

/// モックGPUバインディング
///
/// Handles are sequential starting at 1; the fabric token of handle `h` is
/// a fixed byte pattern derived from `h`, so two allocations never share a
/// token and tests can assert stability across repeated reads.
#[derive(Debug)]
pub struct MockGpuBinding {
    next_handle: AtomicU64,
    fail_next: AtomicBool,
    live: Mutex<HashMap<u64, u64>>,
}

impl Default for MockGpuBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpuBinding {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            fail_next: AtomicBool::new(false),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `allocate` call fail with `OutOfMemory`.
    pub fn fail_next_allocation(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of allocations that have not been released.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Total bytes across live allocations.
    pub fn live_bytes(&self) -> u64 {
        self.live.lock().values().sum()
    }

    fn fabric_for(handle: u64) -> FabricHandle {
        let mut bytes = [0u8; FABRIC_HANDLE_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (handle as u8).wrapping_mul(31).wrapping_add(i as u8);
        }
        FabricHandle::from_bytes(bytes)
    }
}

impl GpuBinding for MockGpuBinding {
    fn allocate(&self, size: u64) -> GpuResult<GpuAllocation> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GpuError::OutOfMemory { requested: size });
        }

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(handle, size);

        Ok(GpuAllocation {
            handle,
            fabric: Self::fabric_for(handle),
        })
    }

    fn release(&self, handle: u64) -> GpuResult<()> {
        // 存在しないハンドルの解放は no-op
        self.live.lock().remove(&handle);
        Ok(())
    }
}
