// src/filesystem.rs

//! Live filesystem helpers
//!
//! Thin wrappers over `std::fs` that resolve package paths below an install
//! root and report file type, mode and ownership the way the conflict
//! checks compare them.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Mode and ownership of a live file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStat {
    /// File-type and permission bits, as `st_mode`
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl LiveStat {
    fn from_metadata(metadata: &fs::Metadata) -> Self {
        Self {
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
        }
    }
}

/// Stat without following a final symlink; `None` when nothing is there
pub fn lstat(path: &Path) -> Option<LiveStat> {
    fs::symlink_metadata(path)
        .ok()
        .map(|m| LiveStat::from_metadata(&m))
}

/// Stat following symlinks; `None` when the path or its target is missing
pub fn stat(path: &Path) -> Option<LiveStat> {
    fs::metadata(path).ok().map(|m| LiveStat::from_metadata(&m))
}

/// Join a package path onto `root`, refusing `..` components
pub fn safe_join(root: &Path, path: &str) -> io::Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                warn!("Path traversal attempt detected: {}", path);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Path traversal detected: {}", path),
                ));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Empty path after normalization",
        ));
    }

    Ok(root.join(normalized))
}

/// Remove a file, symlink or empty directory
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{S_IFDIR, S_IFLNK, S_IFMT};

    #[test]
    fn test_safe_join() {
        let root = Path::new("/tmp/root");
        assert_eq!(
            safe_join(root, "usr/bin/ls").unwrap(),
            PathBuf::from("/tmp/root/usr/bin/ls")
        );
        assert_eq!(
            safe_join(root, "/./etc/fstab").unwrap(),
            PathBuf::from("/tmp/root/etc/fstab")
        );
        assert!(safe_join(root, "usr/../../etc/shadow").is_err());
        assert!(safe_join(root, "/").is_err());
    }

    #[test]
    fn test_lstat_and_stat_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        let link = dir.path().join("link");
        fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(lstat(&link).unwrap().mode & S_IFMT, S_IFLNK);
        assert_eq!(stat(&link).unwrap().mode & S_IFMT, S_IFDIR);
        assert!(lstat(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn test_remove_path_handles_dirs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let file = sub.join("file");
        fs::create_dir(&sub).unwrap();
        fs::write(&file, b"x").unwrap();

        assert!(remove_path(&sub).is_err());
        remove_path(&file).unwrap();
        remove_path(&sub).unwrap();
        assert!(!sub.exists());
    }
}
