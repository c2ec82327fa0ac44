// GPUバインディングモジュール
pub mod cuda;
pub mod error;
pub mod mock;

pub use cuda::CudaBinding;
pub use error::{GpuError, GpuResult};
pub use mock::MockGpuBinding;

use std::fmt;

/// 共有ハンドルのバイト長 (CUDA fabric handle)
///
/// This length is part of the external contract: importers read exactly
/// this many bytes from the `user.fabric_handle` attribute and hand them
/// back to the driver unmodified.
pub const FABRIC_HANDLE_SIZE: usize = 64;

/// Opaque driver-side allocation handle
pub type RawAllocationHandle = u64;

/// Shareable export token for one physical allocation
///
/// A fabric handle is a fixed-size byte token. It is not a pointer and has
/// no destructor; copying the bytes across a process boundary is the whole
/// sharing mechanism.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FabricHandle([u8; FABRIC_HANDLE_SIZE]);

impl FabricHandle {
    pub fn from_bytes(bytes: [u8; FABRIC_HANDLE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FABRIC_HANDLE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for FabricHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 64 opaque bytes are noise in logs; show a short prefix
        write!(
            f,
            "FabricHandle({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// One physical device allocation together with its export token
#[derive(Debug, Clone, Copy)]
pub struct GpuAllocation {
    /// Driver allocation handle, needed to release the memory
    pub handle: RawAllocationHandle,

    /// Export token for cross-process import
    pub fabric: FabricHandle,
}

/// GPUドライバ操作トレイト
///
/// The only seam that touches driver state. The daemon uses [`CudaBinding`];
/// tests substitute [`MockGpuBinding`] for deterministic handles.
///
/// Implementations must be safe to call from multiple dispatcher threads
/// at once (the driver API is reentrant for these operations).
pub trait GpuBinding: Send + Sync {
    /// Allocate `size` bytes of pinned device memory and export it as a
    /// shareable fabric handle.
    fn allocate(&self, size: u64) -> GpuResult<GpuAllocation>;

    /// Release a physical allocation.
    ///
    /// Idempotent on handles that are no longer (or never were) live.
    /// Releasing does not invalidate fabric-handle copies already exported
    /// to other processes; their mappings stay valid until they unmap.
    fn release(&self, handle: RawAllocationHandle) -> GpuResult<()>;
}
