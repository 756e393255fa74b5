use bitflags::bitflags;

bitflags! {
    /// The subset of `open(2)` flags that decides read/write intent.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRONLY = libc::O_WRONLY as u32;
        const RDWR = libc::O_RDWR as u32;
        const APPEND = libc::O_APPEND as u32;
        const CREAT = libc::O_CREAT as u32;
        const TRUNC = libc::O_TRUNC as u32;

        /// Any flag that may modify the file.
        const ANY_WRITE = Self::WRONLY.bits()
            | Self::RDWR.bits()
            | Self::APPEND.bits()
            | Self::CREAT.bits()
            | Self::TRUNC.bits();
    }
}

impl OpenFlags {
    /// Keep the intent bits of a raw request and drop everything else.
    pub fn from_raw(flags: u32) -> Self {
        Self::from_bits_truncate(flags)
    }

    pub fn is_any_write(self) -> bool {
        self.intersects(Self::ANY_WRITE)
    }

    pub fn is_write_only(self) -> bool {
        self.contains(Self::WRONLY)
    }

    /// True when the request wants to read, i.e. the access mode is not
    /// `O_WRONLY`.
    pub fn wants_read(self) -> bool {
        !self.is_write_only()
    }

    /// A write-intent open: some write capability and `O_WRONLY`.
    pub fn is_write_request(self) -> bool {
        self.is_any_write() && self.is_write_only()
    }
}
