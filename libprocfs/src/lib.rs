//! Callback-backed virtual files exposed through a flat FUSE directory.
//!
//! A host registers named files on a [`ProcFs`]; reading one of them calls the
//! host's producer, writing calls its consumer. Nothing is stored on disk.
//!
//! ```no_run
//! use libprocfs::{MountConfig, ProcFs};
//! use std::sync::Arc;
//!
//! # async fn run() -> libprocfs::Result<()> {
//! let fs = Arc::new(ProcFs::new());
//! fs.register_read_only("version", 0o444, || b"1.0\n".to_vec())?;
//! let server = fs.prepare_mount("/tmp/procfs", &MountConfig::default()).await?;
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```
#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod ops;
pub mod procfs;
pub mod server;
mod util;

pub use config::MountConfig;
pub use error::{ProcFsError, Result};
pub use ops::{DirEntry, FileAttributes, FileHandle, FileKind, FileSystemOps};
pub use procfs::{
    ContentCallbacks, DynamicFile, FileEntry, PermissionPolicy, ProcFs, ReadCallback,
    WriteCallback,
};
pub use server::{FuseServer, Server};
pub use util::open_flags::OpenFlags;
pub use util::open_options::OpenOptions;

/// Install an `env_logger` reading `RUST_LOG`, defaulting to `info`.
///
/// Calling it more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

// Test utilities (only compiled during tests)
#[cfg(test)]
pub mod test_utils {
    /// Macro: unwrap result or skip test when encountering EPERM (Permission denied).
    ///
    /// Behavior:
    /// - On Ok(v): returns v
    /// - On Err(e) where e -> io::Error has raw_os_error()==EPERM (or PermissionDenied):
    ///     * If env RUN_PRIVILEGED_TESTS=1 -> panic (treat as hard failure)
    ///     * Else: print a line indicating skip and `return` from test.
    /// - On Err(e) other than EPERM -> panic with diagnostic.
    #[macro_export]
    macro_rules! unwrap_or_skip_eperm {
        ($expr:expr, $ctx:expr) => {{
            match $expr {
                Ok(v) => v,
                Err(e) => {
                    let ioerr: std::io::Error = e.into();
                    let is_eperm = ioerr.raw_os_error() == Some(libc::EPERM)
                        || ioerr.kind() == std::io::ErrorKind::PermissionDenied;
                    if is_eperm {
                        if std::env::var("RUN_PRIVILEGED_TESTS").ok().as_deref() == Some("1") {
                            panic!(
                                "{} failed with EPERM while RUN_PRIVILEGED_TESTS=1: {:?}",
                                $ctx, ioerr
                            );
                        } else {
                            eprintln!("skip (EPERM) {}: {:?}", $ctx, ioerr);
                            return;
                        }
                    }
                    panic!("{} unexpected error: {:?}", $ctx, ioerr);
                }
            }
        }};
    }
}
