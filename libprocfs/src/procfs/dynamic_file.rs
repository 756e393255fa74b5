use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use bytes::Bytes;

use super::callbacks::ContentCallbacks;
use crate::error::Result;
use crate::ops::{FileAttributes, FileHandle};

/// Runtime state of an opened entry: the lazily produced content and the
/// callbacks that produce and consume it.
///
/// `data == None` means the producer has not run since the last
/// invalidation, which is distinct from having produced an empty buffer.
#[derive(Debug)]
pub struct DynamicFile {
    mode: u32,
    size: u64,
    ctime: SystemTime,
    callbacks: ContentCallbacks,
    data: Mutex<Option<Bytes>>,
}

impl DynamicFile {
    pub fn new(mode: u32, size: u64, ctime: SystemTime, callbacks: ContentCallbacks) -> Self {
        Self {
            mode,
            size,
            ctime,
            callbacks,
            data: Mutex::new(None),
        }
    }

    // A producer that panicked leaves the slot untouched, so the guard is
    // still consistent after poisoning.
    fn slot(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the cached content; the next read runs the producer again.
    pub fn invalidate(&self) {
        if self.slot().take().is_some() {
            debug!("dynamic file cache invalidated");
        }
    }

    pub fn is_cached(&self) -> bool {
        self.slot().is_some()
    }

    /// Cached content, producing it first when the cache is empty.
    pub fn content(&self) -> Bytes {
        let mut slot = self.slot();
        if let Some(data) = slot.as_ref() {
            return data.clone();
        }
        let data = match &self.callbacks.on_read {
            Some(on_read) => Bytes::from(on_read()),
            None => {
                debug!("dynamic file has no producer, serving empty content");
                Bytes::new()
            }
        };
        debug!("dynamic file cache populated with {} bytes", data.len());
        *slot = Some(data.clone());
        data
    }
}

impl FileHandle for DynamicFile {
    fn get_attributes(&self) -> FileAttributes {
        FileAttributes::regular(self.mode, self.size, self.ctime)
    }

    fn read(&self, offset: u64, size: usize) -> Bytes {
        let data = self.content();
        let len = data.len() as u64;
        if offset >= len {
            return Bytes::new();
        }
        let end = offset.saturating_add(size as u64).min(len);
        data.slice(offset as usize..end as usize)
    }

    fn write(&self, data: &[u8], offset: u64) -> usize {
        if offset > 0 {
            debug!("ignoring write of {} bytes at offset {offset}", data.len());
            return 0;
        }
        match &self.callbacks.on_write {
            Some(on_write) => on_write(data),
            None => warn!("write to dynamic file without a consumer dropped"),
        }
        data.len()
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    // Only the cache is dropped; the nominal size stays as registered.
    fn truncate(&self, _size: u64) -> Result<()> {
        self.invalidate();
        Ok(())
    }
}
