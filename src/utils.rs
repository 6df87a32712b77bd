use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use crate::errors::{AppError, Result};
use log::{info, warn};

/// Maximum title length passed on to messages and file names.
pub const MAX_TITLE_CHARS: usize = 100;

const MAX_DIR_ATTEMPTS: usize = 8;

fn whitespace_run() -> Option<&'static Regex> {
    static WS: OnceLock<Option<Regex>> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").ok()).as_ref()
}

/// Sanitizes a media title: drops characters illegal in file paths, collapses whitespace and
/// caps the length.
pub fn sanitize_title(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| c.is_whitespace() || !c.is_control())
        .collect();

    let collapsed = match whitespace_run() {
        Some(re) => re.replace_all(&stripped, " ").to_string(),
        None => stripped.split_whitespace().collect::<Vec<_>>().join(" "),
    };

    collapsed.trim().chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}

/// Removes a file or directory tree. Missing paths are fine; other errors are logged and dropped
/// so they never mask the outcome already computed.
pub async fn cleanup(path: &Path) {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!("[CLEANUP] cannot stat {:?}: {}", path, e);
            return;
        }
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => info!("[CLEANUP] removed {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("[CLEANUP] failed to remove {:?}: {}", path, e),
    }
}

/// Blocking variant of [`cleanup`] for drop paths and worker threads.
pub fn cleanup_blocking(path: &Path) {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!("[CLEANUP] cannot stat {:?}: {}", path, e);
            return;
        }
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => info!("[CLEANUP] removed {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("[CLEANUP] failed to remove {:?}: {}", path, e),
    }
}

/// A request's private output directory. Removed on drop unless handed over with
/// [`persist`](Self::persist).
#[derive(Debug)]
pub struct ScopedDir {
    path: PathBuf,
    armed: bool,
}

impl ScopedDir {
    /// Creates a fresh directory `root/name`. If that path is already taken (for instance by
    /// artifacts a previous caller has not consumed yet) a random suffix is appended instead;
    /// an existing directory is never reused or removed.
    pub async fn create_unique(root: &Path, name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let mut candidate = root.join(name);
        for _ in 0..MAX_DIR_ATTEMPTS {
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => return Ok(Self { path: candidate, armed: true }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("[CLEANUP] {:?} is still in use, picking another directory", candidate);
                    let suffix = uuid::Uuid::new_v4().simple().to_string();
                    candidate = root.join(format!("{}-{}", name, &suffix[..6]));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Download(format!("No free output directory for {} under {:?}", name, root)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands the directory to the caller, who becomes responsible for removing it.
    pub fn persist(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    pub async fn remove(mut self) {
        self.armed = false;
        cleanup(&self.path).await;
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if self.armed {
            cleanup_blocking(&self.path);
        }
    }
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Formats seconds as `m:ss`.
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_illegal_characters() {
        assert_eq!(sanitize_title(r#"AC/DC: "Back" <in> Black?*|\"#), "ACDC Back in Black");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_title("  Test \t\n Track  "), "Test Track");
    }

    #[test]
    fn sanitize_caps_length_on_char_boundaries() {
        let long = "é".repeat(150);
        let title = sanitize_title(&long);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(61), "1:01");
        assert_eq!(format_duration(7260), "121:00");
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("job");
        std::fs::create_dir_all(target.join("nested")).unwrap();
        std::fs::write(target.join("nested").join("a.mp3"), b"data").unwrap();

        cleanup(&target).await;
        assert!(!target.exists());
        cleanup(&target).await;
        cleanup_blocking(&target);
    }

    #[tokio::test]
    async fn cleanup_removes_single_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"data").unwrap();
        cleanup(&file).await;
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn scoped_dir_is_removed_unless_persisted() {
        let root = tempfile::tempdir().unwrap();

        let dropped = root.path().join("dropped");
        let scoped = ScopedDir::create_unique(root.path(), "dropped").await.unwrap();
        std::fs::write(scoped.path().join("partial.part"), b"x").unwrap();
        drop(scoped);
        assert!(!dropped.exists());

        let kept = root.path().join("kept");
        let scoped = ScopedDir::create_unique(root.path(), "kept").await.unwrap();
        assert_eq!(scoped.persist(), kept);
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn existing_directories_are_never_reused() {
        let root = tempfile::tempdir().unwrap();
        let taken = root.path().join("job");
        std::fs::create_dir_all(&taken).unwrap();
        std::fs::write(taken.join("owned.mp3"), b"owned").unwrap();

        let scoped = ScopedDir::create_unique(root.path(), "job").await.unwrap();
        assert_ne!(scoped.path(), taken.as_path());
        assert!(scoped.path().file_name().unwrap().to_string_lossy().starts_with("job-"));
        assert!(taken.join("owned.mp3").exists());

        let fresh = scoped.path().to_path_buf();
        scoped.remove().await;
        assert!(!fresh.exists());
        assert!(taken.join("owned.mp3").exists());
    }
}
