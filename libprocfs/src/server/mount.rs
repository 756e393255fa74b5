//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Linux; unprivileged mounts go through fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::future::Future;
use std::path::{Path, PathBuf};

use rfuse3::MountOptions;
use rfuse3::raw::MountHandle;

use super::FuseServer;
use crate::config::MountConfig;
use crate::error::Result;
use crate::ops::FileSystemOps;

/// Build mount options from a [`MountConfig`].
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn mount_options(config: &MountConfig) -> MountOptions {
    let (uid, gid) = config.owner();
    let mut mo = MountOptions::default();
    mo.fs_name(config.fs_name.as_str())
        .uid(uid)
        .gid(gid)
        .allow_other(config.allow_other)
        .read_only(config.read_only)
        .force_readdir_plus(true);
    mo
}

/// A mounted filesystem. Dropping it without [`Server::unmount`] leaves the
/// session to end when the kernel unmounts the directory.
pub struct Server {
    handle: MountHandle,
    mountpoint: PathBuf,
}

impl Server {
    /// Mount `fs` on the given empty directory.
    #[cfg(target_os = "linux")]
    pub async fn mount<F: FileSystemOps>(
        fs: FuseServer<F>,
        mountpoint: impl AsRef<Path>,
        config: &MountConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mountpoint = mountpoint.as_ref().to_path_buf();
        let session = rfuse3::raw::Session::new(mount_options(config));
        let handle = if config.unprivileged {
            session.mount_with_unprivileged(fs, &mountpoint).await?
        } else {
            session.mount(fs, &mountpoint).await?
        };
        info!("mounted {} at {}", config.fs_name, mountpoint.display());
        Ok(Self { handle, mountpoint })
    }

    /// Fallback for non-Linux targets.
    #[cfg(not(target_os = "linux"))]
    pub async fn mount<F: FileSystemOps>(
        _fs: FuseServer<F>,
        _mountpoint: impl AsRef<Path>,
        _config: &MountConfig,
    ) -> Result<Self> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "FUSE mount is only supported on Linux in this build",
        )
        .into())
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Serve requests until the filesystem is unmounted from outside.
    pub async fn serve(self) -> Result<()> {
        self.handle.await?;
        info!("{} unmounted", self.mountpoint.display());
        Ok(())
    }

    /// Serve requests until `shutdown` completes, then unmount.
    pub async fn serve_until<S>(mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let handle = &mut self.handle;
        tokio::select! {
            res = handle => res?,
            _ = shutdown => {
                info!("unmounting {}", self.mountpoint.display());
                self.handle.unmount().await?;
            }
        }
        Ok(())
    }

    pub async fn unmount(self) -> Result<()> {
        info!("unmounting {}", self.mountpoint.display());
        self.handle.unmount().await?;
        Ok(())
    }
}

#[cfg(all(test, target_os = "linux"))]
mod mount_tests {
    use super::*;
    use crate::procfs::ProcFs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // FUSE smoke test, gated by LIBPROCFS_FUSE_TEST=1.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_mount_and_basic_ops() {
        if std::env::var("LIBPROCFS_FUSE_TEST").ok().as_deref() != Some("1") {
            eprintln!("skip fuse mount test: set LIBPROCFS_FUSE_TEST=1 to enable");
            return;
        }

        let version = Arc::new(Mutex::new("v1".to_string()));
        let knob = Arc::new(Mutex::new(Vec::new()));
        let fs = Arc::new(ProcFs::new());
        let v = version.clone();
        fs.register_read_only("status", 0o444, move || v.lock().unwrap().clone().into_bytes())
            .unwrap();
        let k = knob.clone();
        fs.register_read_write(
            "cfg",
            0o666,
            || b"A".to_vec(),
            move |buf| *k.lock().unwrap() = buf.to_vec(),
        )
        .unwrap();

        let mnt = tempfile::tempdir().expect("tmp mount");
        let mnt_path = mnt.path().to_path_buf();
        let server = crate::unwrap_or_skip_eperm!(
            fs.prepare_mount(&mnt_path, &MountConfig::default()).await,
            "mount session"
        );
        tokio::time::sleep(Duration::from_millis(500)).await;

        let path = mnt_path.clone();
        let v2 = version.clone();
        tokio::task::spawn_blocking(move || {
            use std::io::Write;

            assert_eq!(std::fs::read_to_string(path.join("status")).unwrap(), "v1");
            *v2.lock().unwrap() = "v2".to_string();
            assert_eq!(std::fs::read_to_string(path.join("status")).unwrap(), "v2");

            let mut f = std::fs::OpenOptions::new()
                .write(true)
                .open(path.join("cfg"))
                .unwrap();
            f.write_all(b"B").unwrap();
            drop(f);
            assert_eq!(std::fs::read_to_string(path.join("cfg")).unwrap(), "A");

            let mut names: Vec<_> = std::fs::read_dir(&path)
                .unwrap()
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            assert_eq!(names, ["cfg", "status"]);
        })
        .await
        .unwrap();
        assert_eq!(*knob.lock().unwrap(), b"B");

        if let Err(e) = server.unmount().await {
            eprintln!("unmount error: {e}");
        }
    }
}
