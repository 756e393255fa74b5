use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProcFsError, Result};

/// Mount options for serving a filesystem over FUSE.
///
/// Every field has a default, so a YAML file only needs the keys it changes:
///
/// ```yaml
/// fs_name: myapp
/// allow_other: true
/// attr_ttl_secs: 0
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub fs_name: String,
    pub allow_other: bool,
    pub read_only: bool,
    /// Mount through `fusermount3` instead of calling mount(2) directly.
    pub unprivileged: bool,
    /// Owner reported for all nodes; defaults to the current process.
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub entry_ttl_secs: u64,
    pub attr_ttl_secs: u64,
    pub max_write: u32,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: "procfs".to_string(),
            allow_other: false,
            read_only: false,
            unprivileged: true,
            uid: None,
            gid: None,
            entry_ttl_secs: 1,
            attr_ttl_secs: 1,
            max_write: 1024 * 1024,
        }
    }
}

impl MountConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fs_name.is_empty() {
            return Err(ProcFsError::Config("fs_name must not be empty".into()));
        }
        if self.max_write == 0 {
            return Err(ProcFsError::Config("max_write must be positive".into()));
        }
        Ok(())
    }

    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    pub fn max_write(&self) -> NonZeroU32 {
        NonZeroU32::new(self.max_write).unwrap_or(NonZeroU32::MIN)
    }

    pub fn owner(&self) -> (u32, u32) {
        let uid = self.uid.unwrap_or_else(|| unsafe { libc::getuid() });
        let gid = self.gid.unwrap_or_else(|| unsafe { libc::getgid() });
        (uid, gid)
    }
}
