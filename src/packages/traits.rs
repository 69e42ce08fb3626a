// src/packages/traits.rs

//! Archive collaborator interface
//!
//! The install transaction only needs to stream a package twice: once to
//! collect its manifest, once to extract it with a per-entry destination.

use crate::db::models::{S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFREG};
use crate::error::Result;
use std::path::Path;

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    /// Hard link to an earlier entry; recorded as a regular file
    Hardlink,
    CharDevice,
    BlockDevice,
    Fifo,
}

impl EntryKind {
    /// File-type bits for this kind
    pub fn type_bits(&self) -> u32 {
        match self {
            EntryKind::Regular | EntryKind::Hardlink => S_IFREG,
            EntryKind::Directory => S_IFDIR,
            EntryKind::Symlink => S_IFLNK,
            EntryKind::CharDevice => S_IFCHR,
            EntryKind::BlockDevice => S_IFBLK,
            EntryKind::Fifo => S_IFIFO,
        }
    }
}

/// Metadata of one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized path: no leading `./` or `/`, no trailing `/`
    pub path: String,
    pub kind: EntryKind,
    /// File-type and permission bits
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Symlink target, or the linked path of a hard link
    pub link_target: Option<String>,
    /// Major and minor numbers of a device node
    pub device: Option<(u32, u32)>,
}

impl ArchiveEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Path as it appears in the archive, directories with a trailing `/`
    pub fn archive_path(&self) -> String {
        if self.is_dir() {
            format!("{}/", self.path)
        } else {
            self.path.clone()
        }
    }
}

/// Where an entry goes during extraction, relative to the install root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Skip,
    Install(String),
    /// Quarantined copy of an entry that must not overwrite the live file
    Reject(String),
}

/// Extraction behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractFlags {
    pub preserve_owner: bool,
    pub preserve_perms: bool,
    /// Remove an existing non-directory before writing
    pub unlink: bool,
}

impl Default for ExtractFlags {
    fn default() -> Self {
        Self {
            preserve_owner: true,
            preserve_perms: true,
            unlink: true,
        }
    }
}

/// A single entry that could not be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractFailure {
    pub path: String,
    pub reason: String,
}

/// Accounting of an extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub installed: usize,
    pub skipped: usize,
    /// Archive paths written to the quarantine directory
    pub rejected: Vec<String>,
    pub failed: Vec<ExtractFailure>,
}

/// Common interface for package archives
pub trait PackageArchive {
    /// Location of the archive
    fn path(&self) -> &Path;

    /// Stream the archive once and return its entries in archive order
    fn manifest(&self) -> Result<Vec<ArchiveEntry>>;

    /// Stream the archive again and write entries below `root`
    ///
    /// `plan` is called with the manifest index of every entry and decides
    /// its destination. Per-entry failures are logged and collected in the
    /// report; only a failure to read the archive itself is an error.
    fn extract(
        &self,
        root: &Path,
        flags: ExtractFlags,
        plan: &mut dyn FnMut(usize, &ArchiveEntry) -> Destination,
    ) -> Result<ExtractReport>;
}
