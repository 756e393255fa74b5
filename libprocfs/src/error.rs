use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcFsError>;

#[derive(Debug, Error)]
pub enum ProcFsError {
    #[error("no such file: {0:?}")]
    NotFound(String),

    #[error("file already registered: {0:?}")]
    AlreadyRegistered(String),

    #[error("operation not permitted on {0:?}")]
    PermissionDenied(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ProcFsError {
    /// POSIX error number reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::AlreadyRegistered(_) => libc::EEXIST,
            Self::PermissionDenied(_) => libc::EPERM,
            Self::InvalidName(_) | Self::Config(_) | Self::Yaml(_) => libc::EINVAL,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<ProcFsError> for rfuse3::Errno {
    fn from(err: ProcFsError) -> Self {
        err.errno().into()
    }
}

impl From<ProcFsError> for io::Error {
    fn from(err: ProcFsError) -> Self {
        match err {
            ProcFsError::Io(e) => e,
            other => io::Error::from_raw_os_error(other.errno()),
        }
    }
}
