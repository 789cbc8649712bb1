//! Scoped ownership of temporary audio files.
//!
//! A [`ResourceJanitor`] hands out unique paths and removes every path it
//! still owns when dropped, whether the request succeeded, failed or
//! returned early. Paths that were never created are skipped silently.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// File name prefix for every acquired path.
const FILE_PREFIX: &str = "nova-";

/// Owns temporary paths for the duration of one request.
#[derive(Debug)]
pub struct ResourceJanitor {
    dir: PathBuf,
    paths: Vec<PathBuf>,
}

impl ResourceJanitor {
    /// Create a janitor that places files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            paths: Vec::new(),
        }
    }

    /// Create a janitor over the OS temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Directory new paths are placed in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh path ending in `suffix` (e.g. `".wav"`).
    ///
    /// The file itself is not created.
    pub fn acquire(&mut self, suffix: &str) -> PathBuf {
        let name = format!("{FILE_PREFIX}{}{suffix}", uuid::Uuid::new_v4());
        let path = self.dir.join(name);
        debug!("acquired temp path {}", path.display());
        self.paths.push(path.clone());
        path
    }

    /// Stop owning `path`; it survives this scope.
    ///
    /// Returns `false` if the path was not owned by this janitor.
    pub fn release(&mut self, path: &Path) -> bool {
        match self.paths.iter().position(|p| p == path) {
            Some(index) => {
                self.paths.remove(index);
                true
            }
            None => false,
        }
    }

    /// Paths currently owned, in acquisition order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every owned path now, newest first.
    pub fn cleanup(&mut self) {
        while let Some(path) = self.paths.pop() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to remove temp file {}: {e}", path.display()),
            }
        }
    }
}

impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn acquired_paths_are_unique_and_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        let mut janitor = ResourceJanitor::new(dir.path());
        let a = janitor.acquire(".webm");
        let b = janitor.acquire(".webm");
        assert_ne!(a, b);
        assert!(a.starts_with(dir.path()));
        assert!(a.to_string_lossy().ends_with(".webm"));
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(FILE_PREFIX)
        );
        assert!(!a.exists());
        assert_eq!(janitor.paths(), &[a, b]);
    }

    #[test]
    fn drop_removes_created_files_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (created, never_created) = {
            let mut janitor = ResourceJanitor::new(dir.path());
            let created = janitor.acquire(".wav");
            let never_created = janitor.acquire(".mp3");
            std::fs::write(&created, b"RIFF").unwrap();
            (created, never_created)
        };
        assert!(!created.exists());
        assert!(!never_created.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn released_path_survives_drop() {
        let dir = tempfile::tempdir().unwrap();
        let kept = {
            let mut janitor = ResourceJanitor::new(dir.path());
            let kept = janitor.acquire(".mp3");
            let scratch = janitor.acquire(".tmp");
            std::fs::write(&kept, b"ID3").unwrap();
            std::fs::write(&scratch, b"x").unwrap();
            assert!(janitor.release(&kept));
            assert!(!janitor.release(&kept));
            kept
        };
        assert!(kept.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn cleanup_on_early_return() {
        fn fails(dir: &Path) -> Result<(), std::io::Error> {
            let mut janitor = ResourceJanitor::new(dir);
            let path = janitor.acquire(".webm");
            std::fs::write(&path, b"data")?;
            Err(std::io::Error::other("converter exploded"))
        }

        let dir = tempfile::tempdir().unwrap();
        assert!(fails(dir.path()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
