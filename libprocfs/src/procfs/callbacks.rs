use std::fmt;
use std::sync::Arc;

/// Produces the full content of a file each time its cache is empty.
pub type ReadCallback = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

/// Receives the buffer of a write at offset zero.
pub type WriteCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Producer/consumer pair supplied by the host for one file.
///
/// A missing producer makes the file unreadable, a missing consumer makes it
/// unwritable; both are enforced when the file is opened.
#[derive(Clone, Default)]
pub struct ContentCallbacks {
    pub(crate) on_read: Option<ReadCallback>,
    pub(crate) on_write: Option<WriteCallback>,
}

impl ContentCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        self.on_read = Some(Arc::new(f));
        self
    }

    pub fn on_write<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.on_write = Some(Arc::new(f));
        self
    }

    pub fn readable(&self) -> bool {
        self.on_read.is_some()
    }

    pub fn writable(&self) -> bool {
        self.on_write.is_some()
    }
}

impl fmt::Debug for ContentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCallbacks")
            .field("on_read", &self.readable())
            .field("on_write", &self.writable())
            .finish()
    }
}
