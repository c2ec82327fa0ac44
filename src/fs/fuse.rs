//! FUSE adapter.
//!
//! Maps kernel VFS requests onto [`GpuMemFs`] operations. The adapter owns
//! only the inode bookkeeping the FUSE protocol forces on it; every
//! filesystem decision lives in the core. Truncate and utimens both arrive
//! through `setattr` and are split back out here.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyXattr, Request, TimeOrNow, FUSE_ROOT_ID,
};
use libc::{c_int, EINVAL, ENOENT};

use crate::constants::ATTR_TTL_SECS;

use super::error::FsError;
use super::ops::{GpuMemFs, TimeSet};
use super::xattr::XattrReply;
use super::{FileKind, FileStat};

/// FUSEアダプタ
///
/// The mount-point face of the daemon. All entries live directly under the
/// root, so inode allocation is a flat path↔inode table rooted at
/// `FUSE_ROOT_ID`.
pub struct GpuMemFuse {
    fs: Arc<GpuMemFs>,

    /// inode -> path
    inodes: HashMap<u64, String>,

    /// path -> inode
    paths: HashMap<String, u64>,

    next_inode: u64,
}

fn ttl() -> Duration {
    Duration::from_secs(ATTR_TTL_SECS)
}

fn epoch_to_system(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn time_or_now(t: TimeOrNow) -> TimeSet {
    match t {
        TimeOrNow::Now => TimeSet::Now,
        TimeOrNow::SpecificTime(at) => TimeSet::Epoch(
            at.duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
        ),
    }
}

impl GpuMemFuse {
    pub fn new(fs: Arc<GpuMemFs>) -> Self {
        let mut inodes = HashMap::new();
        let mut paths = HashMap::new();
        inodes.insert(FUSE_ROOT_ID, "/".to_string());
        paths.insert("/".to_string(), FUSE_ROOT_ID);

        Self {
            fs,
            inodes,
            paths,
            next_inode: FUSE_ROOT_ID + 1,
        }
    }

    fn inode_to_path(&self, ino: u64) -> Option<&str> {
        self.inodes.get(&ino).map(|p| p.as_str())
    }

    fn get_or_alloc_inode(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.paths.get(path) {
            return ino;
        }

        let ino = self.next_inode;
        self.next_inode += 1;
        self.inodes.insert(ino, path.to_string());
        self.paths.insert(path.to_string(), ino);
        ino
    }

    fn dealloc_inode(&mut self, path: &str) {
        if let Some(ino) = self.paths.remove(path) {
            self.inodes.remove(&ino);
        }
    }

    fn child_path(name: &OsStr) -> Option<String> {
        let name = name.to_str()?;
        Some(format!("/{}", name))
    }

    fn attr_to_fuse(&self, stat: &FileStat, ino: u64) -> FileAttr {
        let kind = match stat.kind {
            FileKind::Directory => FileType::Directory,
            FileKind::Regular => FileType::RegularFile,
        };

        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: epoch_to_system(stat.atime),
            mtime: epoch_to_system(stat.mtime),
            ctime: epoch_to_system(stat.ctime),
            crtime: epoch_to_system(stat.ctime),
            kind,
            perm: stat.mode as u16,
            nlink: stat.nlink,
            uid: stat.uid,
            gid: stat.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn xattr_reply(result: Result<XattrReply, FsError>, reply: ReplyXattr) {
        match result {
            Ok(XattrReply::Length(len)) => reply.size(len as u32),
            Ok(XattrReply::Value(bytes)) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }
}

impl fuser::Filesystem for GpuMemFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        tracing::info!("GPU memory filesystem mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!("GPU memory filesystem unmounting");
        self.fs.shutdown();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != FUSE_ROOT_ID {
            reply.error(ENOENT);
            return;
        }

        let Some(path) = Self::child_path(name) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.get_or_alloc_inode(&path);
                let attr = self.attr_to_fuse(&stat, ino);
                reply.entry(&ttl(), &attr, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.inode_to_path(ino).map(str::to_string) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let attr = self.attr_to_fuse(&stat, ino);
                reply.attr(&ttl(), &attr);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    /// Truncate and timestamp updates both arrive here.
    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.inode_to_path(ino).map(str::to_string) else {
            reply.error(ENOENT);
            return;
        };

        if let Some(new_size) = size {
            if let Err(e) = self.fs.truncate(&path, new_size) {
                reply.error(e.errno());
                return;
            }
        }

        if atime.is_some() || mtime.is_some() {
            let result = self
                .fs
                .utimens(&path, atime.map(time_or_now), mtime.map(time_or_now));
            if let Err(e) = result {
                reply.error(e.errno());
                return;
            }
        }

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let attr = self.attr_to_fuse(&stat, ino);
                reply.attr(&ttl(), &attr);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        if parent != FUSE_ROOT_ID {
            reply.error(ENOENT);
            return;
        }

        let Some(path) = Self::child_path(name) else {
            reply.error(EINVAL);
            return;
        };

        if let Err(e) = self.fs.create(&path) {
            reply.error(e.errno());
            return;
        }

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.get_or_alloc_inode(&path);
                let attr = self.attr_to_fuse(&stat, ino);
                reply.created(&ttl(), &attr, 0, 0, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inode_to_path(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.open(path) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.inode_to_path(ino) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.read(path, size as usize, offset) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // No per-open state to drop
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent != FUSE_ROOT_ID {
            reply.error(ENOENT);
            return;
        }

        let Some(path) = Self::child_path(name) else {
            reply.error(ENOENT);
            return;
        };

        match self.fs.unlink(&path) {
            Ok(()) => {
                self.dealloc_inode(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != FUSE_ROOT_ID {
            reply.error(ENOENT);
            return;
        }

        let names = self.fs.readdir();

        let mut entries: Vec<(u64, FileType, String)> = Vec::with_capacity(names.len() + 2);
        entries.push((FUSE_ROOT_ID, FileType::Directory, ".".to_string()));
        entries.push((FUSE_ROOT_ID, FileType::Directory, "..".to_string()));
        for name in names {
            let path = format!("/{}", name);
            let ino = self.get_or_alloc_inode(&path);
            entries.push((ino, FileType::RegularFile, name));
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let Some(path) = self.inode_to_path(ino) else {
            reply.error(ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENODATA);
            return;
        };

        Self::xattr_reply(self.fs.getxattr(path, name, size as usize), reply);
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let Some(path) = self.inode_to_path(ino) else {
            reply.error(ENOENT);
            return;
        };

        Self::xattr_reply(self.fs.listxattr(path, size as usize), reply);
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.inode_to_path(ino) else {
            reply.error(ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(EINVAL);
            return;
        };

        match self.fs.setxattr(path, name, value) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }
}
