use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use uuid::Uuid;

/// Per-run scratch directory holding generated source files.
///
/// Removed on drop, so every exit path of a run (success, failure, early
/// return, panic) deletes what the run wrote.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/run-<run_id>`; `root` is created if missing
    pub fn create(root: &Path, run_id: Uuid) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        // Docker bind mounts need an absolute host path
        let root = fs::canonicalize(root)?;
        let path = root.join(format!("run-{}", run_id));
        fs::create_dir(&path)?;

        debug!(path = %path.display(), "Created scratch directory");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file directly inside the scratch directory
    pub async fn write(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid scratch file name: {}", name),
            ));
        }

        let path = self.path.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch directory"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to clean up scratch directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(root.path(), Uuid::new_v4()).unwrap();
        let file = scratch.write("solution.py", "print('hi')").await.unwrap();
        assert!(file.exists());

        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!dir.exists());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(root.path(), Uuid::new_v4()).unwrap();
        assert!(scratch.write("../escape.py", "").await.is_err());
        assert!(scratch.write(".hidden", "").await.is_err());
    }

    #[test]
    fn test_distinct_runs_get_distinct_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchDir::create(root.path(), Uuid::new_v4()).unwrap();
        let b = ScratchDir::create(root.path(), Uuid::new_v4()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
