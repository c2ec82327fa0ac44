//! Error type surfaced at handler boundaries.
//!
//! Every handler returns `FsError`; the FUSE adapter turns it into an
//! errno with [`FsError::errno`]. GPU binding errors are wrapped at the
//! call site (allocation failures become `OutOfMemory`, release failures
//! become `Io`) and never leave a record partially mutated.

use thiserror::Error;

use crate::alloc::RegistryError;

/// ハンドラ境界エラー
#[derive(Debug, Error)]
pub enum FsError {
    #[error("No such allocation: {0}")]
    NotFound(String),

    #[error("Allocation already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No data for attribute: {0}")]
    NoData(String),

    #[error("Buffer too small: required {required} bytes, available {available}")]
    Range { required: usize, available: usize },

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// 対応するerrnoを返す
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::NoData(_) => libc::ENODATA,
            FsError::Range { .. } => libc::ERANGE,
            FsError::OutOfMemory(_) => libc::ENOMEM,
            FsError::Io(_) => libc::EIO,
            FsError::NotSupported(_) => libc::ENOTSUP,
        }
    }
}

impl From<RegistryError> for FsError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(path) => FsError::NotFound(path),
            RegistryError::AlreadyExists(path) => FsError::AlreadyExists(path),
        }
    }
}
