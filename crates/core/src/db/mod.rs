pub mod catalog;
pub mod index;
pub mod lock_file;
pub mod relational_db;
pub mod schema;
pub mod storage;
pub mod value;

use crate::error::DBError;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;

/// Serialize `value` to `path` so a crash exposes either the old contents or
/// the new, never a prefix: write a sibling temp file, fsync it, then rename
/// over the target.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), DBError> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&file, value)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
