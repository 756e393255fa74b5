use bitflags::bitflags;

// Flags used by the OPEN reply.
/// Bypass page cache for this open file.
const FOPEN_DIRECT_IO: u32 = 1;

bitflags! {
    /// Options returned to the kernel for files opened by the server.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenOptions: u32 {
        /// Bypass page cache for this open file.
        const DIRECT_IO = FOPEN_DIRECT_IO;
    }
}

impl OpenOptions {
    /// Reply flags for dynamic files: content is produced per open, so the
    /// page cache must never serve it and the nominal size must not clip reads.
    pub fn dynamic() -> Self {
        OpenOptions::DIRECT_IO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_files_use_direct_io() {
        let opts = OpenOptions::dynamic();
        assert!(opts.contains(OpenOptions::DIRECT_IO));
        assert_eq!(opts.bits(), 1);
    }
}
