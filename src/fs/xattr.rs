//! Extended attribute surface.
//!
//! Two read-only attributes are recognized: the shareable fabric handle
//! (binary) and the allocation size (decimal string). Query semantics
//! follow the xattr syscall contract: a zero-size query asks for the
//! needed length, an undersized buffer is `ERANGE`, and attributes of an
//! unmaterialized entry answer `ENODATA`.

use crate::constants::{XATTR_ALLOCATION_SIZE, XATTR_FABRIC_HANDLE};

use super::error::{FsError, FsResult};
use super::ops::GpuMemFs;

/// getxattr / listxattr の応答
///
/// `Length` answers a zero-size probe; `Value` carries the attribute
/// bytes for a sufficiently sized buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrReply {
    Length(usize),
    Value(Vec<u8>),
}

impl XattrReply {
    /// Helper for tests and callers that expect a value.
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            XattrReply::Value(bytes) => Some(bytes),
            XattrReply::Length(_) => None,
        }
    }
}

fn answer(value: &[u8], query_size: usize) -> FsResult<XattrReply> {
    if query_size == 0 {
        return Ok(XattrReply::Length(value.len()));
    }
    if query_size < value.len() {
        return Err(FsError::Range {
            required: value.len(),
            available: query_size,
        });
    }
    Ok(XattrReply::Value(value.to_vec()))
}

impl GpuMemFs {
    /// 拡張属性を取得
    pub fn getxattr(&self, path: &str, name: &str, query_size: usize) -> FsResult<XattrReply> {
        let record = self.lookup_record(path)?;
        let state = record.lock();

        match name {
            XATTR_FABRIC_HANDLE => {
                let Some(alloc) = state.gpu() else {
                    return Err(FsError::NoData(name.to_string()));
                };
                answer(alloc.fabric.as_bytes(), query_size)
            }
            XATTR_ALLOCATION_SIZE => {
                if !state.is_materialized() {
                    return Err(FsError::NoData(name.to_string()));
                }
                answer(state.size().to_string().as_bytes(), query_size)
            }
            _ => Err(FsError::NoData(name.to_string())),
        }
    }

    /// 拡張属性名の一覧
    ///
    /// NUL-terminated names, fabric handle first. The order is part of the
    /// listing contract and stable across calls. Only attributes that a
    /// `getxattr` would answer are listed, so an unmaterialized entry
    /// lists nothing.
    pub fn listxattr(&self, path: &str, query_size: usize) -> FsResult<XattrReply> {
        let record = self.lookup_record(path)?;
        let state = record.lock();

        let mut names = Vec::new();
        if state.is_materialized() {
            for name in [XATTR_FABRIC_HANDLE, XATTR_ALLOCATION_SIZE] {
                names.extend_from_slice(name.as_bytes());
                names.push(0);
            }
        }

        answer(&names, query_size)
    }

    /// 拡張属性の書き込み
    ///
    /// Every attribute here is driver-derived and read-only, including the
    /// size/durability hint names some clients probe for.
    pub fn setxattr(&self, path: &str, name: &str, _value: &[u8]) -> FsResult<()> {
        self.lookup_record(path)?;
        Err(FsError::NotSupported(format!(
            "attribute {} is not writable",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{XATTR_ALLOCATION_SIZE, XATTR_FABRIC_HANDLE};
    use crate::gpu::{MockGpuBinding, FABRIC_HANDLE_SIZE};
    use std::sync::Arc;

    fn fs_with_buf() -> GpuMemFs {
        let fs = GpuMemFs::new(Arc::new(MockGpuBinding::new()));
        fs.create("/buf").unwrap();
        fs
    }

    #[test]
    fn test_getxattr_absent_path() {
        let fs = GpuMemFs::new(Arc::new(MockGpuBinding::new()));
        assert!(matches!(
            fs.getxattr("/nope", XATTR_FABRIC_HANDLE, 64),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_getxattr_unmaterialized_is_nodata() {
        let fs = fs_with_buf();

        assert!(matches!(
            fs.getxattr("/buf", XATTR_FABRIC_HANDLE, 64),
            Err(FsError::NoData(_))
        ));
        assert!(matches!(
            fs.getxattr("/buf", XATTR_ALLOCATION_SIZE, 32),
            Err(FsError::NoData(_))
        ));
    }

    #[test]
    fn test_getxattr_probe_and_value() {
        let fs = fs_with_buf();
        fs.truncate("/buf", 8388608).unwrap();

        // Zero-size probe answers the needed length
        assert_eq!(
            fs.getxattr("/buf", XATTR_FABRIC_HANDLE, 0).unwrap(),
            XattrReply::Length(FABRIC_HANDLE_SIZE)
        );

        let value = fs
            .getxattr("/buf", XATTR_FABRIC_HANDLE, FABRIC_HANDLE_SIZE)
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(value.len(), FABRIC_HANDLE_SIZE);

        // Repeated reads return identical bytes
        let again = fs
            .getxattr("/buf", XATTR_FABRIC_HANDLE, FABRIC_HANDLE_SIZE)
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(value, again);
    }

    #[test]
    fn test_getxattr_undersized_buffer() {
        let fs = fs_with_buf();
        fs.truncate("/buf", 4096).unwrap();

        assert!(matches!(
            fs.getxattr("/buf", XATTR_FABRIC_HANDLE, 8),
            Err(FsError::Range {
                required: FABRIC_HANDLE_SIZE,
                available: 8
            })
        ));
    }

    #[test]
    fn test_allocation_size_is_decimal_string() {
        let fs = fs_with_buf();
        fs.truncate("/buf", 8388608).unwrap();

        let value = fs
            .getxattr("/buf", XATTR_ALLOCATION_SIZE, 32)
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(value, b"8388608");

        assert_eq!(
            fs.getxattr("/buf", XATTR_ALLOCATION_SIZE, 0).unwrap(),
            XattrReply::Length("8388608".len())
        );
    }

    #[test]
    fn test_unknown_attribute_is_nodata() {
        let fs = fs_with_buf();
        fs.truncate("/buf", 4096).unwrap();

        assert!(matches!(
            fs.getxattr("/buf", "user.unknown", 64),
            Err(FsError::NoData(_))
        ));
    }

    #[test]
    fn test_listxattr_names_and_order() {
        let fs = fs_with_buf();
        fs.truncate("/buf", 4096).unwrap();

        let names = fs.listxattr("/buf", 1024).unwrap().into_value().unwrap();
        let expected = b"user.fabric_handle\0user.allocation_size\0".to_vec();
        assert_eq!(names, expected);

        assert_eq!(
            fs.listxattr("/buf", 0).unwrap(),
            XattrReply::Length(expected.len())
        );
        assert!(matches!(
            fs.listxattr("/buf", 4),
            Err(FsError::Range { .. })
        ));
    }

    #[test]
    fn test_listxattr_unmaterialized_lists_nothing() {
        // Every listed name must be answerable by getxattr, and neither
        // attribute answers before materialization
        let fs = fs_with_buf();

        assert_eq!(fs.listxattr("/buf", 0).unwrap(), XattrReply::Length(0));
        assert_eq!(
            fs.listxattr("/buf", 64).unwrap().into_value().unwrap(),
            Vec::<u8>::new()
        );

        // Releasing the memory empties the listing again
        fs.truncate("/buf", 4096).unwrap();
        fs.truncate("/buf", 0).unwrap();
        assert_eq!(fs.listxattr("/buf", 0).unwrap(), XattrReply::Length(0));
    }

    #[test]
    fn test_setxattr_not_supported() {
        let fs = fs_with_buf();

        assert!(matches!(
            fs.setxattr("/buf", "user.gpu.size", b"4096"),
            Err(FsError::NotSupported(_))
        ));
        assert!(matches!(
            fs.setxattr("/buf", "user.gpu.durable", b"true"),
            Err(FsError::NotSupported(_))
        ));
        // Absent paths still answer ENOENT first
        assert!(matches!(
            fs.setxattr("/nope", "user.gpu.size", b"4096"),
            Err(FsError::NotFound(_))
        ));
    }
}
