//! Global constants for gpumemfs
//!
//! This module centralizes commonly used constants across the codebase
//! to improve maintainability and reduce duplication.

/// Maximum path length for allocation entries (bytes, including the
/// leading slash)
///
/// Paths are registry keys; bounding them keeps key storage predictable
/// and matches what importing clients are told to expect.
pub const MAX_PATH_LEN: usize = 512;

/// Extended attribute exposing the shareable fabric handle
///
/// Binary-valued, exactly [`crate::gpu::FABRIC_HANDLE_SIZE`] bytes.
/// This name is the cross-process retrieval contract: an importer reads it,
/// byte-copies the value, and hands it to the driver on its side.
pub const XATTR_FABRIC_HANDLE: &str = "user.fabric_handle";

/// Extended attribute exposing the allocation size
///
/// String-valued, decimal byte count, no trailing NUL.
pub const XATTR_ALLOCATION_SIZE: &str = "user.allocation_size";

/// Mode reported for allocation entries
pub const FILE_MODE: u32 = 0o644;

/// Mode reported for the root directory
pub const DIR_MODE: u32 = 0o755;

/// Link count reported for the root directory
pub const ROOT_NLINK: u32 = 2;

/// Kernel attribute cache TTL in seconds
///
/// Short, because truncate through one process's view must become visible
/// to other processes on the same mount quickly.
pub const ATTR_TTL_SECS: u64 = 1;
