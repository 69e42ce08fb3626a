// src/db/models.rs

//! Data models for the package database
//!
//! A `Package` owns its `PackageFile` records; files point back at their
//! package by name only, so packages can be dropped while file indexes built
//! during conflict detection are still alive.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// File-type mask of a mode word
pub const S_IFMT: u32 = 0o170000;
/// Directory
pub const S_IFDIR: u32 = 0o040000;
/// Regular file
pub const S_IFREG: u32 = 0o100000;
/// Symbolic link
pub const S_IFLNK: u32 = 0o120000;
/// Character device
pub const S_IFCHR: u32 = 0o020000;
/// Block device
pub const S_IFBLK: u32 = 0o060000;
/// Named pipe
pub const S_IFIFO: u32 = 0o010000;

/// Conflict classification of a file
///
/// A file carries a single kind at a time; the aggregate of a transaction is
/// the bitwise OR of the kinds of its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConflictKind(u8);

impl ConflictKind {
    pub const NONE: ConflictKind = ConflictKind(0);
    /// Same path in the old and new version of the package being upgraded
    pub const SELF: ConflictKind = ConflictKind(1);
    /// Path already owned by another package
    pub const DB: ConflictKind = ConflictKind(2);
    /// Untracked file already present on the filesystem
    pub const FS: ConflictKind = ConflictKind(4);
    /// Directory mode/ownership mismatch, or a directory turned into a
    /// dangling symlink
    pub const PERM: ConflictKind = ConflictKind(8);
    /// Old file still referenced by another installed package
    pub const REF: ConflictKind = ConflictKind(16);

    /// Kinds that block a commit unless forced
    pub const BLOCKING: ConflictKind = ConflictKind(2 | 4 | 8);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`
    pub fn contains(self, other: ConflictKind) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ConflictKind) -> bool {
        self.0 & other.0 != 0
    }

    /// Bits present in both
    pub fn intersection(self, other: ConflictKind) -> ConflictKind {
        ConflictKind(self.0 & other.0)
    }

    /// Bits of `self` not present in `other`
    pub fn difference(self, other: ConflictKind) -> ConflictKind {
        ConflictKind(self.0 & !other.0)
    }
}

impl BitOr for ConflictKind {
    type Output = ConflictKind;

    fn bitor(self, rhs: ConflictKind) -> ConflictKind {
        ConflictKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for ConflictKind {
    fn bitor_assign(&mut self, rhs: ConflictKind) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }

        let names = [
            (ConflictKind::SELF, "self"),
            (ConflictKind::DB, "db"),
            (ConflictKind::FS, "fs"),
            (ConflictKind::PERM, "perm"),
            (ConflictKind::REF, "ref"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(kind, _)| self.contains(*kind))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&parts.join("|"))
    }
}

/// A file recorded for a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    /// Root-relative path, no leading or trailing `/`
    pub path: String,
    /// File-type and permission bits
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub conflict: ConflictKind,
    /// Name of the owning package
    pub package: String,
}

impl PackageFile {
    /// Create a new PackageFile with no conflict mark
    pub fn new(path: String, mode: u32, uid: u32, gid: u32, package: String) -> Self {
        Self {
            path,
            mode,
            uid,
            gid,
            conflict: ConflictKind::NONE,
            package,
        }
    }

    pub fn is_dir(&self) -> bool {
        is_dir_mode(self.mode)
    }
}

/// An installed (or about to be installed) package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// Files in manifest order
    pub files: Vec<PackageFile>,
}

impl Package {
    /// Create a new Package without files
    pub fn new(name: String, version: String) -> Self {
        Self {
            name,
            version,
            files: Vec::new(),
        }
    }

    /// Append a file owned by this package and return its index
    ///
    /// Paths are unique within a package: a repeated path keeps its first
    /// position and takes the metadata of the latest entry.
    pub fn add_file(&mut self, path: String, mode: u32, uid: u32, gid: u32) -> usize {
        if let Some(index) = self.files.iter().position(|f| f.path == path) {
            let file = &mut self.files[index];
            file.mode = mode;
            file.uid = uid;
            file.gid = gid;
            return index;
        }

        let file = PackageFile::new(path, mode, uid, gid, self.name.clone());
        self.files.push(file);
        self.files.len() - 1
    }

    /// Reset every conflict mark to NONE
    pub fn clear_conflicts(&mut self) {
        for file in &mut self.files {
            file.conflict = ConflictKind::NONE;
        }
    }

    /// OR of the kinds carried by this package's files
    pub fn conflicts(&self) -> ConflictKind {
        self.files
            .iter()
            .fold(ConflictKind::NONE, |acc, file| acc | file.conflict)
    }

    /// Indexes of `files` ordered by path
    pub fn sorted_file_indexes(&self) -> Vec<usize> {
        let mut indexes: Vec<usize> = (0..self.files.len()).collect();
        indexes.sort_by(|&a, &b| self.files[a].path.cmp(&self.files[b].path));
        indexes
    }
}

pub fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_kind_bits() {
        let mut kind = ConflictKind::NONE;
        assert!(kind.is_none());

        kind |= ConflictKind::DB;
        kind |= ConflictKind::PERM;
        assert!(kind.contains(ConflictKind::DB));
        assert!(kind.contains(ConflictKind::PERM));
        assert!(!kind.contains(ConflictKind::FS));
        assert!(!kind.contains(ConflictKind::NONE));
        assert_eq!(kind.difference(ConflictKind::PERM), ConflictKind::DB);
        assert_eq!(kind.to_string(), "db|perm");
    }

    #[test]
    fn test_blocking_excludes_informational_kinds() {
        assert!(!ConflictKind::BLOCKING.intersects(ConflictKind::SELF));
        assert!(!ConflictKind::BLOCKING.intersects(ConflictKind::REF));
        assert!(ConflictKind::BLOCKING.contains(ConflictKind::FS));
    }

    #[test]
    fn test_package_conflicts_aggregate() {
        let mut pkg = Package::new("nginx".to_string(), "1.21.0".to_string());
        pkg.add_file("etc".to_string(), S_IFDIR | 0o755, 0, 0);
        pkg.add_file("etc/nginx.conf".to_string(), S_IFREG | 0o644, 0, 0);
        assert_eq!(pkg.files[1].package, "nginx");
        assert!(pkg.files[0].is_dir());
        assert!(!pkg.files[1].is_dir());

        pkg.files[1].conflict = ConflictKind::FS;
        assert_eq!(pkg.conflicts(), ConflictKind::FS);

        pkg.clear_conflicts();
        assert!(pkg.conflicts().is_none());
    }

    #[test]
    fn test_add_file_keeps_paths_unique() {
        let mut pkg = Package::new("p".to_string(), "1".to_string());
        assert_eq!(pkg.add_file("opt".to_string(), S_IFDIR | 0o755, 0, 0), 0);
        assert_eq!(pkg.add_file("opt/x".to_string(), S_IFREG | 0o644, 0, 0), 1);
        assert_eq!(pkg.add_file("opt/x".to_string(), S_IFREG | 0o600, 7, 7), 1);

        assert_eq!(pkg.files.len(), 2);
        assert_eq!(pkg.files[1].mode, S_IFREG | 0o600);
        assert_eq!(pkg.files[1].uid, 7);
    }

    #[test]
    fn test_sorted_file_indexes() {
        let mut pkg = Package::new("p".to_string(), "1".to_string());
        pkg.add_file("usr/bin/z".to_string(), S_IFREG, 0, 0);
        pkg.add_file("usr".to_string(), S_IFDIR, 0, 0);
        pkg.add_file("usr/bin".to_string(), S_IFDIR, 0, 0);
        assert_eq!(pkg.sorted_file_indexes(), vec![1, 2, 0]);
    }
}
