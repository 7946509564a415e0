//! Advisory lock on the data directory, so two processes cannot open the
//! same database.

use crate::error::DBError;
use anyhow::anyhow;
use fs2::FileExt as _;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

pub struct LockFile {
    path: PathBuf,
    #[allow(unused)]
    lock: File,
}

impl LockFile {
    pub fn lock(data_dir: &Path) -> Result<Self, DBError> {
        let path = data_dir.join("db.lock");
        let lock = File::create(&path)?;
        lock.try_lock_exclusive().map_err(|e| {
            DBError::Internal(anyhow!(
                "database at {} is already open: {e}",
                data_dir.display()
            ))
        })?;
        Ok(Self { path, lock })
    }
}

impl fmt::Debug for LockFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFile").field("path", &self.path).finish()
    }
}
