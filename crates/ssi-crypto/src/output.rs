//! Scoped output files: write to `<out>.tmp.<pid>`, rename into place on success.
//!
//! A [`PendingOutput`] that is dropped without [`PendingOutput::commit`] removes
//! its temp file, so every early return (`?`) in a codec leaves no temp file
//! behind. Decoders additionally pass their result through
//! [`clear_target_on_error`] so that a failed decrypt never leaves a file,
//! old or new, at the final path.

use ssi_core::SsiResult;
use std::io::ErrorKind;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

pub struct PendingOutput {
    tmp: PathBuf,
    target: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

/// `<target>.tmp.<pid>`
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(format!(".tmp.{}", std::process::id()));
    PathBuf::from(name)
}

impl PendingOutput {
    pub async fn create(target: &Path) -> SsiResult<Self> {
        let tmp = temp_path_for(target);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .await?;
        tracing::debug!(tmp = %tmp.display(), "opened temp output");
        Ok(Self {
            tmp,
            target: target.to_path_buf(),
            writer: BufWriter::new(file),
            committed: false,
        })
    }

    pub fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    pub fn temp_path(&self) -> &Path {
        &self.tmp
    }

    /// Flush, fsync, and atomically rename the temp file onto the target path.
    pub async fn commit(mut self) -> SsiResult<()> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        tokio::fs::rename(&self.tmp, &self.target).await?;
        self.committed = true;
        tracing::debug!(path = %self.target.display(), "output committed");
        Ok(())
    }
}

impl Drop for PendingOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.tmp) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(tmp = %self.tmp.display(), "failed to remove temp output: {e}");
            }
        }
    }
}

/// Remove `target` when `result` is an error, then hand the result back.
pub async fn clear_target_on_error<T>(target: &Path, result: SsiResult<T>) -> SsiResult<T> {
    if result.is_err() {
        match tokio::fs::remove_file(target).await {
            Ok(()) => tracing::debug!(path = %target.display(), "removed stale output"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %target.display(), "failed to remove stale output: {e}")
            }
        }
    }
    result
}
