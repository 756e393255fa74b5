//! Registry of named dynamic files.
//!
//! [`ProcFs`] maps file names to [`FileEntry`] records in a single flat root
//! directory. Opening an entry hands out its [`DynamicFile`], whose content
//! is produced lazily by the host's read callback and cached until the next
//! read-mode open or truncate.

mod callbacks;
mod dynamic_file;
mod entry;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use std::time::SystemTime;

pub use callbacks::{ContentCallbacks, ReadCallback, WriteCallback};
pub use dynamic_file::DynamicFile;
pub use entry::{FileEntry, NOMINAL_SIZE, PermissionPolicy};

use crate::config::MountConfig;
use crate::error::{ProcFsError, Result};
use crate::ops::{DirEntry, FileAttributes, FileKind, FileSystemOps};
use crate::server::{FuseServer, Server};
use crate::util::open_flags::OpenFlags;

/// Permission bits of the root directory.
pub const ROOT_MODE: u32 = 0o755;

#[derive(Debug)]
pub struct ProcFs {
    ctime: SystemTime,
    policy: PermissionPolicy,
    entries: RwLock<HashMap<String, Arc<FileEntry>>>,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_policy(PermissionPolicy::default())
    }

    pub fn with_policy(policy: PermissionPolicy) -> Self {
        Self {
            ctime: SystemTime::now(),
            policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ctime(&self) -> SystemTime {
        self.ctime
    }

    pub fn policy(&self) -> PermissionPolicy {
        self.policy
    }

    // Registration never leaves the map half updated, so a poisoned lock
    // still guards a valid map.
    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<FileEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<FileEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(ProcFsError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Add a file. Names are unique; a second registration of the same name
    /// fails and keeps the first one.
    pub fn register(&self, name: &str, mode: u32, callbacks: ContentCallbacks) -> Result<()> {
        Self::validate_name(name)?;
        let mut entries = self.entries_mut();
        if entries.contains_key(name) {
            warn!("file {name:?} is already registered");
            return Err(ProcFsError::AlreadyRegistered(name.to_string()));
        }
        debug!("registering {name:?} mode {mode:o} ({callbacks:?})");
        entries.insert(
            name.to_string(),
            Arc::new(FileEntry::new(name, mode, callbacks)),
        );
        Ok(())
    }

    pub fn register_read_only<R>(&self, name: &str, mode: u32, on_read: R) -> Result<()>
    where
        R: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        self.register(name, mode, ContentCallbacks::new().on_read(on_read))
    }

    pub fn register_write_only<W>(&self, name: &str, mode: u32, on_write: W) -> Result<()>
    where
        W: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.register(name, mode, ContentCallbacks::new().on_write(on_write))
    }

    pub fn register_read_write<R, W>(
        &self,
        name: &str,
        mode: u32,
        on_read: R,
        on_write: W,
    ) -> Result<()>
    where
        R: Fn() -> Vec<u8> + Send + Sync + 'static,
        W: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.register(
            name,
            mode,
            ContentCallbacks::new().on_read(on_read).on_write(on_write),
        )
    }

    pub fn entry(&self, name: &str) -> Option<Arc<FileEntry>> {
        self.entries().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop the cached content of `name` so open handles see fresh data on
    /// their next read.
    pub fn invalidate(&self, name: &str) -> Result<()> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ProcFsError::NotFound(name.to_string()))?;
        entry.invalidate();
        Ok(())
    }

    /// Mount this filesystem and return the running server.
    pub async fn prepare_mount(
        self: &Arc<Self>,
        mountpoint: impl AsRef<Path>,
        config: &MountConfig,
    ) -> Result<Server> {
        let fs = FuseServer::new(self.clone(), config);
        Server::mount(fs, mountpoint, config).await
    }
}

impl FileSystemOps for ProcFs {
    type Handle = DynamicFile;

    fn get_attributes(&self, name: &str) -> Result<FileAttributes> {
        if name.is_empty() {
            return Ok(FileAttributes::directory(ROOT_MODE, self.ctime));
        }
        self.entries()
            .get(name)
            .map(|entry| entry.get_attributes())
            .ok_or_else(|| ProcFsError::NotFound(name.to_string()))
    }

    fn list_directory(&self, name: &str) -> Result<Vec<DirEntry>> {
        if !name.is_empty() {
            return Err(ProcFsError::NotFound(name.to_string()));
        }
        Ok(self
            .entries()
            .keys()
            .map(|name| DirEntry {
                name: name.clone(),
                kind: FileKind::RegularFile,
            })
            .collect())
    }

    fn open(&self, name: &str, flags: u32) -> Result<Arc<DynamicFile>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ProcFsError::NotFound(name.to_string()))?;
        let flags = OpenFlags::from_raw(flags);
        if !entry.has_permission(flags, self.policy) {
            info!("open of {name:?} with {flags:?} denied");
            return Err(ProcFsError::PermissionDenied(name.to_string()));
        }
        // Anything but a write-only open starts from freshly produced content.
        let flush = !flags.is_write_request();
        Ok(entry.open_file(flush))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::FileHandle;

    #[test]
    fn rejects_invalid_names() {
        let fs = ProcFs::new();
        for name in ["", ".", "..", "a/b", "nul\0"] {
            let err = fs.register_read_only(name, 0o444, Vec::new).unwrap_err();
            assert!(matches!(err, ProcFsError::InvalidName(_)), "{name:?}");
        }
        assert!(fs.is_empty());
    }

    #[test]
    fn root_attributes() {
        let fs = ProcFs::new();
        let attr = fs.get_attributes("").unwrap();
        assert_eq!(attr.kind, FileKind::Directory);
        assert_eq!(attr.mode, libc::S_IFDIR as u32 | ROOT_MODE);
        assert_eq!(attr.ctime, fs.ctime());
    }

    #[test]
    fn invalidate_drops_cache_of_open_file() {
        let fs = ProcFs::new();
        fs.register_read_only("a", 0o444, || b"x".to_vec()).unwrap();
        let file = fs.open("a", libc::O_RDONLY as u32).unwrap();
        file.read(0, 1);
        assert!(file.is_cached());
        fs.invalidate("a").unwrap();
        assert!(!file.is_cached());
        assert!(matches!(
            fs.invalidate("missing"),
            Err(ProcFsError::NotFound(_))
        ));
    }

    #[test]
    fn relaxed_policy_allows_read_write_open() {
        let fs = ProcFs::with_policy(PermissionPolicy::Relaxed);
        fs.register_read_write("rw", 0o666, Vec::new, |_| {}).unwrap();
        assert!(fs.open("rw", libc::O_RDWR as u32).is_ok());

        let strict = ProcFs::new();
        strict.register_read_write("rw", 0o666, Vec::new, |_| {}).unwrap();
        assert!(matches!(
            strict.open("rw", libc::O_RDWR as u32),
            Err(ProcFsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn read_write_open_refreshes_content() {
        let fs = ProcFs::with_policy(PermissionPolicy::Relaxed);
        let state = Arc::new(std::sync::Mutex::new("v1"));
        let s = state.clone();
        fs.register_read_write(
            "cfg",
            0o666,
            move || s.lock().unwrap().as_bytes().to_vec(),
            |_| {},
        )
        .unwrap();

        let reader = fs.open("cfg", libc::O_RDONLY as u32).unwrap();
        assert_eq!(reader.read(0, 16).as_ref(), b"v1");
        *state.lock().unwrap() = "v2";

        let rw = fs.open("cfg", libc::O_RDWR as u32).unwrap();
        assert_eq!(rw.read(0, 16).as_ref(), b"v2");

        // A write-only open leaves the cache alone.
        *state.lock().unwrap() = "v3";
        let writer = fs.open("cfg", libc::O_WRONLY as u32).unwrap();
        assert!(writer.is_cached());
        assert_eq!(rw.read(0, 16).as_ref(), b"v2");
    }
}
