use std::{
  io,
  path::{Path, PathBuf},
  time::Instant,
};

use tracing::{debug, info, warn};

/// Shared directory holding per-request temporary media files.
#[derive(Clone, Debug)]
pub struct ScratchDir {
  base_dir: PathBuf,
}

/// Namespace inside the scratch directory owned by a single request. Every
/// path it hands out carries the same unique prefix, so concurrent
/// requests never collide and need no locking.
#[derive(Debug)]
pub struct ScratchSession {
  base_dir: PathBuf,
  prefix: String,
}

/// A temporary file path owned by one request. The file is removed when the
/// handle is released or dropped, whichever comes first.
#[derive(Debug)]
pub struct TempHandle {
  path: PathBuf,
  created_at: Instant,
  released: bool,
}

impl ScratchDir {
  pub fn new(base_dir: impl AsRef<Path>) -> Self {
    Self {
      base_dir: base_dir.as_ref().to_owned(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.base_dir
  }

  /// Create the directory and remove anything a previous run left behind.
  pub async fn prepare(&self) -> io::Result<usize> {
    tokio::fs::create_dir_all(&self.base_dir).await?;
    let removed = self.purge()?;
    if removed > 0 {
      info!(removed, dir = %self.base_dir.display(), "purged stale files");
    }
    Ok(removed)
  }

  pub fn session(&self) -> ScratchSession {
    let prefix = format!(
      "{}-{:08x}",
      chrono::Utc::now().timestamp_millis(),
      rand::random::<u32>()
    );

    ScratchSession {
      base_dir: self.base_dir.clone(),
      prefix,
    }
  }

  /// Best-effort removal of every file in the directory.
  pub fn purge(&self) -> io::Result<usize> {
    let entries = match std::fs::read_dir(&self.base_dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
      Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries.flatten() {
      let path = entry.path();
      if !path.is_file() {
        continue;
      }
      match std::fs::remove_file(&path) {
        Ok(()) => removed += 1,
        Err(e) => warn!("failed to delete {}: {}", path.display(), e),
      }
    }

    Ok(removed)
  }
}

impl ScratchSession {
  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  pub fn allocate(&self, label: &str, ext: &str) -> TempHandle {
    let name = format!("{}_{}.{}", self.prefix, label, ext);
    TempHandle::new(self.base_dir.join(name))
  }
}

impl TempHandle {
  fn new(path: PathBuf) -> Self {
    Self {
      path,
      created_at: Instant::now(),
      released: false,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Delete the underlying file. Calling this again, or on a file that was
  /// never written or is already gone, does nothing.
  pub fn release(&mut self) {
    if self.released {
      return;
    }
    self.released = true;

    match std::fs::remove_file(&self.path) {
      Ok(()) => debug!(
        path = %self.path.display(),
        age_ms = self.created_at.elapsed().as_millis() as u64,
        "released temp file"
      ),
      Err(e) if e.kind() == io::ErrorKind::NotFound => (),
      Err(e) => warn!("failed to delete file {}: {}", self.path.display(), e),
    }
  }
}

impl Drop for TempHandle {
  fn drop(&mut self) {
    self.release();
  }
}

#[cfg(test)]
pub(crate) fn count_files(dir: &Path) -> usize {
  std::fs::read_dir(dir)
    .map(|entries| entries.flatten().filter(|e| e.path().is_file()).count())
    .unwrap_or(0)
}
