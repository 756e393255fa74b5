//! Capability set the transport drives.
//!
//! The FUSE adapter in [`crate::server`] only knows these two traits, so any
//! flat, name-addressed filesystem can be served by it.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::Result;

/// Kind of a node in the flat namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// Attributes reported for the root directory or a registered file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub kind: FileKind,
    /// Type bits (`S_IFDIR`/`S_IFREG`) or'ed with the permission bits.
    pub mode: u32,
    /// Nominal size; reads are not bounded by it.
    pub size: u64,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
}

impl FileAttributes {
    pub fn regular(perm: u32, size: u64, ctime: SystemTime) -> Self {
        Self {
            kind: FileKind::RegularFile,
            mode: libc::S_IFREG as u32 | perm,
            size,
            ctime,
            mtime: SystemTime::now(),
        }
    }

    pub fn directory(perm: u32, ctime: SystemTime) -> Self {
        Self {
            kind: FileKind::Directory,
            mode: libc::S_IFDIR as u32 | perm,
            size: 0,
            ctime,
            mtime: SystemTime::now(),
        }
    }

    /// Permission bits without the file type.
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// An open file as seen by the transport.
pub trait FileHandle: Send + Sync + 'static {
    fn get_attributes(&self) -> FileAttributes;

    /// Return at most `size` bytes starting at `offset`. Offsets past the end
    /// yield an empty buffer.
    fn read(&self, offset: u64, size: usize) -> Bytes;

    /// Returns the number of bytes accepted: `data.len()` at offset 0,
    /// whatever the consumer does with them, and 0 at any other offset.
    fn write(&self, data: &[u8], offset: u64) -> usize;

    fn flush(&self) -> Result<()>;

    fn sync(&self) -> Result<()>;

    fn truncate(&self, size: u64) -> Result<()>;
}

/// Name-addressed filesystem queries. The empty name is the root directory.
pub trait FileSystemOps: Send + Sync + 'static {
    type Handle: FileHandle;

    fn get_attributes(&self, name: &str) -> Result<FileAttributes>;

    fn list_directory(&self, name: &str) -> Result<Vec<DirEntry>>;

    /// `flags` are the raw `open(2)` flags of the request.
    fn open(&self, name: &str, flags: u32) -> Result<Arc<Self::Handle>>;
}
