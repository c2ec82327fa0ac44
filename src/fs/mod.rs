// ファイルシステムコアモジュール
pub mod error;
pub mod fuse;
pub mod ops;
pub mod xattr;

pub use error::{FsError, FsResult};
pub use fuse::GpuMemFuse;
pub use ops::{GpuMemFs, TimeSet};
pub use xattr::XattrReply;

/// ファイル種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

/// ファイル統計情報
///
/// What `getattr` reports for the root directory or an allocation entry.
/// The size of an entry is the allocation size; an unmaterialized entry
/// reports 0.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}
