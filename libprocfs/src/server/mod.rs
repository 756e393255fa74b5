//! FUSE adapter and mount lifecycle.
//!
//! [`FuseServer`] translates rfuse3 requests into calls on any
//! [`FileSystemOps`] implementation:
//! - inode numbers are assigned per name by an internal table, the root is
//!   inode 1 and it is the only directory;
//! - every successful `open` gets its own `fh`, released on `release`;
//! - attribute/entry replies carry the TTLs of the [`MountConfig`].
//!
//! [`Server`] owns the mount and exposes serve/unmount.
mod inode;
pub mod mount;

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use rfuse3::Result as FuseResult;
use rfuse3::raw::Filesystem;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
};
use rfuse3::{FileType as FuseFileType, SetAttr, Timestamp};

pub use inode::ROOT_INODE;
pub use mount::Server;

use crate::config::MountConfig;
use crate::ops::{FileAttributes, FileHandle, FileKind, FileSystemOps};
use crate::util::open_options::OpenOptions;
use inode::InodeTable;

pub struct FuseServer<F: FileSystemOps> {
    fs: Arc<F>,
    inodes: Mutex<InodeTable>,
    handles: Mutex<HashMap<u64, Arc<F::Handle>>>,
    next_fh: AtomicU64,
    entry_ttl: Duration,
    attr_ttl: Duration,
    max_write: NonZeroU32,
    owner: (u32, u32),
}

impl<F: FileSystemOps> FuseServer<F> {
    pub fn new(fs: Arc<F>, config: &MountConfig) -> Self {
        Self {
            fs,
            inodes: Mutex::new(InodeTable::new()),
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            entry_ttl: config.entry_ttl(),
            attr_ttl: config.attr_ttl(),
            max_write: config.max_write(),
            owner: config.owner(),
        }
    }

    fn inodes(&self) -> MutexGuard<'_, InodeTable> {
        self.inodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<u64, Arc<F::Handle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of a file inode; the root maps to the empty name.
    fn name_of(&self, ino: u64) -> FuseResult<String> {
        if ino == ROOT_INODE {
            return Ok(String::new());
        }
        self.inodes()
            .name_of(ino)
            .map(str::to_string)
            .ok_or_else(|| libc::ENOENT.into())
    }

    fn ino_of(&self, name: &str) -> u64 {
        if name.is_empty() {
            return ROOT_INODE;
        }
        self.inodes().ino_of(name)
    }

    fn handle(&self, fh: u64) -> FuseResult<Arc<F::Handle>> {
        self.handles()
            .get(&fh)
            .cloned()
            .ok_or_else(|| libc::EBADF.into())
    }

    /// Stores an opened handle and returns its `fh`.
    fn insert_handle(&self, handle: Arc<F::Handle>) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles().insert(fh, handle);
        fh
    }

    fn attr_of(&self, ino: u64, attr: &FileAttributes) -> FileAttr {
        to_fuse_attr(ino, attr, self.owner)
    }

    fn stat(&self, ino: u64) -> FuseResult<FileAttr> {
        let name = self.name_of(ino)?;
        let attr = self.fs.get_attributes(&name)?;
        Ok(self.attr_of(ino, &attr))
    }

    fn root_entries(&self, ino: u64) -> FuseResult<Vec<(u64, String, FileAttributes)>> {
        if ino != ROOT_INODE {
            // Files exist but are not directories; anything else is gone.
            self.name_of(ino)?;
            return Err(libc::ENOTDIR.into());
        }
        let mut entries = self.fs.list_directory("")?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            // An entry listed but unreadable is skipped rather than failing
            // the whole listing.
            let Ok(attr) = self.fs.get_attributes(&e.name) else {
                continue;
            };
            out.push((self.ino_of(&e.name), e.name, attr));
        }
        Ok(out)
    }
}

impl<F: FileSystemOps> Filesystem for FuseServer<F> {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        info!("fuse session initialized");
        Ok(ReplyInit {
            max_write: self.max_write,
        })
    }

    async fn destroy(&self, _req: Request) {
        info!("fuse session destroyed");
    }

    // Only the root has children.
    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        if parent != ROOT_INODE {
            return Err(libc::ENOENT.into());
        }
        let Some(name) = name.to_str() else {
            return Err(libc::ENOENT.into());
        };
        let attr = self.fs.get_attributes(name)?;
        let ino = self.ino_of(name);
        Ok(ReplyEntry {
            ttl: self.entry_ttl,
            attr: self.attr_of(ino, &attr),
            generation: 0,
        })
    }

    async fn forget(&self, _req: Request, _inode: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let attr = match fh.and_then(|fh| self.handles().get(&fh).cloned()) {
            Some(handle) => self.attr_of(ino, &handle.get_attributes()),
            None => self.stat(ino)?,
        };
        Ok(ReplyAttr {
            ttl: self.attr_ttl,
            attr,
        })
    }

    // Only size changes are honoured; they drop the cached content.
    async fn setattr(
        &self,
        _req: Request,
        ino: u64,
        fh: Option<u64>,
        set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        if let Some(size) = set_attr.size {
            let name = self.name_of(ino)?;
            if name.is_empty() {
                return Err(libc::EISDIR.into());
            }
            let handle = match fh.and_then(|fh| self.handles().get(&fh).cloned()) {
                Some(handle) => handle,
                None => self.fs.open(&name, libc::O_WRONLY as u32)?,
            };
            handle.truncate(size)?;
        }
        Ok(ReplyAttr {
            ttl: self.attr_ttl,
            attr: self.stat(ino)?,
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        let name = self.name_of(ino)?;
        if name.is_empty() {
            return Err(libc::EISDIR.into());
        }
        let handle = self.fs.open(&name, flags).inspect_err(|e| {
            debug!("open {name:?} flags {flags:#o}: {e}");
        })?;
        let fh = self.insert_handle(handle);
        Ok(ReplyOpen {
            fh,
            flags: OpenOptions::dynamic().bits(),
        })
    }

    async fn read(
        &self,
        _req: Request,
        _ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let handle = self.handle(fh)?;
        Ok(ReplyData {
            data: handle.read(offset, size as usize),
        })
    }

    async fn write(
        &self,
        _req: Request,
        _ino: u64,
        fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        let handle = self.handle(fh)?;
        let written = handle.write(data, offset);
        Ok(ReplyWrite {
            written: written as u32,
        })
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        let files = self.fs.list_directory("")?.len() as u64;
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files,
            ffree: 0,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        self.handles().remove(&fh);
        Ok(())
    }

    async fn flush(&self, _req: Request, _inode: u64, fh: u64, _lock_owner: u64) -> FuseResult<()> {
        self.handle(fh)?.flush()?;
        Ok(())
    }

    async fn fsync(&self, _req: Request, _inode: u64, fh: u64, _datasync: bool) -> FuseResult<()> {
        self.handle(fh)?.sync()?;
        Ok(())
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        if ino != ROOT_INODE {
            self.name_of(ino)?;
            return Err(libc::ENOTDIR.into());
        }
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    // `offset` is the offset of the last entry already returned.
    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let entries = self.root_entries(ino)?;
        let mut all: Vec<DirectoryEntry> = Vec::with_capacity(entries.len() + 2);
        for (i, name) in [".", ".."].into_iter().enumerate() {
            all.push(DirectoryEntry {
                inode: ROOT_INODE,
                kind: FuseFileType::Directory,
                name: OsString::from(name),
                offset: i as i64 + 1,
            });
        }
        for (i, (child, name, attr)) in entries.into_iter().enumerate() {
            all.push(DirectoryEntry {
                inode: child,
                kind: to_fuse_kind(attr.kind),
                name: OsString::from(name),
                offset: i as i64 + 3,
            });
        }

        let start = offset.max(0) as usize;
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all.split_off(start)
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let entries = self.root_entries(ino)?;
        let root = self.stat(ROOT_INODE)?;
        let mut all: Vec<DirectoryEntryPlus> = Vec::with_capacity(entries.len() + 2);
        for (i, name) in [".", ".."].into_iter().enumerate() {
            all.push(DirectoryEntryPlus {
                inode: ROOT_INODE,
                generation: 0,
                kind: FuseFileType::Directory,
                name: OsString::from(name),
                offset: i as i64 + 1,
                attr: root,
                entry_ttl: self.entry_ttl,
                attr_ttl: self.attr_ttl,
            });
        }
        for (i, (child, name, attr)) in entries.into_iter().enumerate() {
            all.push(DirectoryEntryPlus {
                inode: child,
                generation: 0,
                kind: to_fuse_kind(attr.kind),
                name: OsString::from(name),
                offset: i as i64 + 3,
                attr: self.attr_of(child, &attr),
                entry_ttl: self.entry_ttl,
                attr_ttl: self.attr_ttl,
            });
        }

        let start = offset as usize;
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all.split_off(start)
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }
}

// =============== helpers ===============
fn to_fuse_kind(kind: FileKind) -> FuseFileType {
    match kind {
        FileKind::Directory => FuseFileType::Directory,
        FileKind::RegularFile => FuseFileType::RegularFile,
    }
}

fn to_fuse_attr(ino: u64, attr: &FileAttributes, (uid, gid): (u32, u32)) -> FileAttr {
    let mtime = Timestamp::from(attr.mtime);
    let ctime = Timestamp::from(attr.ctime);
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime,
        #[cfg(target_os = "macos")]
        crtime: ctime,
        kind: to_fuse_kind(attr.kind),
        perm: attr.perm() as u16,
        nlink: if attr.kind == FileKind::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}
