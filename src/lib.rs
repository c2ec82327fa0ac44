//! gpumemfs - GPU device memory exposed as a user-space filesystem
//!
//! gpumemfs makes physical GPU buffers addressable by path: creating,
//! sizing and deleting files inside the mount point drives GPU memory
//! allocation, and the shareable export token of each buffer is published
//! as an extended attribute. The point of the exercise is **cross-process
//! buffer sharing**: a process that can name a path can read the
//! `user.fabric_handle` attribute, import the token through the GPU
//! driver, and map the identical physical pages into its own address
//! space.
//!
//! # Architecture
//!
//! - **GPU Binding** ([`gpu`]): the only seam that touches driver state.
//!   [`gpu::CudaBinding`] allocates pinned device memory through the CUDA
//!   VMM API and exports fabric handles; [`gpu::MockGpuBinding`] supplies
//!   deterministic handles for tests.
//! - **Allocation Registry** ([`alloc`]): process-wide path-keyed map of
//!   allocation records. One coarse lock over the map, one lock per record
//!   over its mutable state; GPU calls only ever run under the per-record
//!   lock.
//! - **Filesystem Core** ([`fs`]): the lifecycle engine translating
//!   create / truncate / unlink / xattr requests into registry and GPU
//!   transitions, plus the `fuser` adapter that feeds it from the kernel.
//! - **Daemon plumbing** ([`config`], [`logging`], [`server`]): TOML
//!   configuration, tracing setup and signal-driven shutdown for the
//!   `gpumemfsd` binary.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gpumemfs::fs::GpuMemFs;
//! use gpumemfs::gpu::{MockGpuBinding, FABRIC_HANDLE_SIZE};
//!
//! let fs = GpuMemFs::new(Arc::new(MockGpuBinding::new()));
//!
//! // create + truncate materializes a buffer
//! fs.create("/buf").unwrap();
//! fs.truncate("/buf", 8 * 1024 * 1024).unwrap();
//!
//! // the shareable handle is an xattr value of fixed size
//! let handle = fs
//!     .getxattr("/buf", "user.fabric_handle", FABRIC_HANDLE_SIZE)
//!     .unwrap()
//!     .into_value()
//!     .unwrap();
//! assert_eq!(handle.len(), FABRIC_HANDLE_SIZE);
//! ```

pub mod alloc;
pub mod config;
pub mod constants;
pub mod fs;
pub mod gpu;
pub mod logging;
pub mod server;
