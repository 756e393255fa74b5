use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::callbacks::ContentCallbacks;
use super::dynamic_file::DynamicFile;
use crate::ops::FileAttributes;
use crate::util::open_flags::OpenFlags;

/// Size advertised for every entry. Reads return the real content length.
pub const NOMINAL_SIZE: u64 = 1;

/// How open flags are matched against the callbacks of an entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionPolicy {
    /// A write open must be `O_WRONLY` and needs a consumer. Any other open
    /// carrying a write bit (`O_RDWR`, `O_RDONLY|O_TRUNC`, ...) is refused,
    /// everything else needs a producer.
    #[default]
    Strict,
    /// Each requested capability needs its callback: reading needs a producer,
    /// any write bit needs a consumer. `O_RDWR` therefore needs both.
    Relaxed,
}

/// Registry record of one named file.
#[derive(Debug)]
pub struct FileEntry {
    name: String,
    mode: u32,
    size: u64,
    ctime: SystemTime,
    callbacks: ContentCallbacks,
    file: OnceLock<Arc<DynamicFile>>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, mode: u32, callbacks: ContentCallbacks) -> Self {
        Self {
            name: name.into(),
            mode,
            size: NOMINAL_SIZE,
            ctime: SystemTime::now(),
            callbacks,
            file: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn ctime(&self) -> SystemTime {
        self.ctime
    }

    pub fn get_attributes(&self) -> FileAttributes {
        FileAttributes::regular(self.mode, self.size, self.ctime)
    }

    pub fn has_permission(&self, flags: OpenFlags, policy: PermissionPolicy) -> bool {
        match policy {
            PermissionPolicy::Strict => {
                if flags.is_any_write() {
                    return flags.is_write_only() && self.callbacks.writable();
                }
                self.callbacks.readable()
            }
            PermissionPolicy::Relaxed => {
                let read_ok = !flags.wants_read() || self.callbacks.readable();
                let write_ok = !flags.is_any_write() || self.callbacks.writable();
                read_ok && write_ok
            }
        }
    }

    /// The entry's file, created on first use. `flush` drops its cached
    /// content before it is handed out.
    pub fn open_file(&self, flush: bool) -> Arc<DynamicFile> {
        let file = self.file.get_or_init(|| {
            debug!("creating dynamic file for {:?}", self.name);
            Arc::new(DynamicFile::new(
                self.mode,
                self.size,
                self.ctime,
                self.callbacks.clone(),
            ))
        });
        if flush {
            file.invalidate();
        }
        file.clone()
    }

    /// The file if it was opened before.
    pub fn cached_file(&self) -> Option<&Arc<DynamicFile>> {
        self.file.get()
    }

    /// Drop the cached content of an already opened file.
    pub fn invalidate(&self) {
        if let Some(file) = self.file.get() {
            file.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(raw: i32) -> OpenFlags {
        OpenFlags::from_raw(raw as u32)
    }

    fn read_only() -> FileEntry {
        FileEntry::new("ro", 0o444, ContentCallbacks::new().on_read(Vec::new))
    }

    fn write_only() -> FileEntry {
        FileEntry::new("wo", 0o222, ContentCallbacks::new().on_write(|_| {}))
    }

    fn read_write() -> FileEntry {
        FileEntry::new(
            "rw",
            0o666,
            ContentCallbacks::new().on_read(Vec::new).on_write(|_| {}),
        )
    }

    #[test]
    fn strict_policy() {
        let p = PermissionPolicy::Strict;
        assert!(read_only().has_permission(flags(libc::O_RDONLY), p));
        assert!(!read_only().has_permission(flags(libc::O_WRONLY), p));
        assert!(!read_only().has_permission(flags(libc::O_RDWR), p));

        assert!(!write_only().has_permission(flags(libc::O_RDONLY), p));
        assert!(write_only().has_permission(flags(libc::O_WRONLY | libc::O_TRUNC), p));

        // O_RDWR carries a write bit without O_WRONLY: always refused.
        assert!(!read_write().has_permission(flags(libc::O_RDWR), p));
        assert!(!read_write().has_permission(flags(libc::O_RDONLY | libc::O_TRUNC), p));
        assert!(read_write().has_permission(flags(libc::O_RDONLY), p));
        assert!(read_write().has_permission(flags(libc::O_WRONLY), p));
    }

    #[test]
    fn relaxed_policy() {
        let p = PermissionPolicy::Relaxed;
        assert!(read_write().has_permission(flags(libc::O_RDWR), p));
        assert!(!read_only().has_permission(flags(libc::O_RDWR), p));
        assert!(!write_only().has_permission(flags(libc::O_RDWR), p));
        assert!(write_only().has_permission(flags(libc::O_WRONLY | libc::O_APPEND), p));
        assert!(!read_only().has_permission(flags(libc::O_RDONLY | libc::O_TRUNC), p));
        assert!(read_only().has_permission(flags(libc::O_RDONLY), p));
    }

    #[test]
    fn file_is_created_once() {
        let entry = read_only();
        assert!(entry.cached_file().is_none());
        let a = entry.open_file(true);
        let b = entry.open_file(false);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn concurrent_first_opens_share_one_file() {
        let entry = Arc::new(read_only());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let entry = entry.clone();
                std::thread::spawn(move || entry.open_file(true))
            })
            .collect();
        let files: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(files.iter().all(|f| Arc::ptr_eq(f, &files[0])));
    }

    #[test]
    fn attributes_use_nominal_size() {
        let entry = read_write();
        let attr = entry.get_attributes();
        assert_eq!(attr.size, NOMINAL_SIZE);
        assert_eq!(attr.perm(), 0o666);
        assert_eq!(attr.ctime, entry.ctime());
    }
}
