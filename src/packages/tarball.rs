// src/packages/tarball.rs

//! Tarball package archives
//!
//! Reads `.pkg.tar.gz` packages (and `.pkg.tar.xz` / `.pkg.tar.zst`) with the
//! `tar` crate over a decoder picked from the filename suffix.

use crate::error::{Error, Result};
use crate::filesystem::safe_join;
use crate::packages::traits::{
    ArchiveEntry, Destination, EntryKind, ExtractFailure, ExtractFlags, ExtractReport,
    PackageArchive,
};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, warn};
use xz2::read::XzDecoder;

/// Package compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionFormat {
    Gzip,
    Xz,
    Zstd,
}

/// A package archive on disk
#[derive(Debug, Clone)]
pub struct TarPackage {
    package_path: PathBuf,
    compression: CompressionFormat,
}

impl TarPackage {
    /// Open a package archive, checking that it is readable
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let package_path = path.as_ref().to_path_buf();
        let compression = Self::detect_compression(&package_path)?;

        File::open(&package_path).map_err(|e| {
            Error::Archive(format!(
                "Can't open package {}: {}",
                package_path.display(),
                e
            ))
        })?;

        Ok(Self {
            package_path,
            compression,
        })
    }

    /// Detect compression format from file extension
    fn detect_compression(path: &Path) -> Result<CompressionFormat> {
        let name = path.to_string_lossy();
        if name.ends_with(".tar.gz") {
            Ok(CompressionFormat::Gzip)
        } else if name.ends_with(".tar.xz") {
            Ok(CompressionFormat::Xz)
        } else if name.ends_with(".tar.zst") {
            Ok(CompressionFormat::Zstd)
        } else {
            Err(Error::Archive(format!(
                "Unsupported package format: {}. Expected .pkg.tar.gz, .pkg.tar.xz, or .pkg.tar.zst",
                name
            )))
        }
    }

    /// Open and decompress the package archive
    fn open_archive(&self) -> Result<Archive<Box<dyn Read>>> {
        let file = File::open(&self.package_path)
            .map_err(|e| Error::Archive(format!("Failed to open package file: {}", e)))?;

        let reader: Box<dyn Read> = match self.compression {
            CompressionFormat::Gzip => Box::new(GzDecoder::new(file)),
            CompressionFormat::Xz => Box::new(XzDecoder::new(file)),
            CompressionFormat::Zstd => {
                let decoder = zstd::Decoder::new(file).map_err(|e| {
                    Error::Archive(format!("Failed to create zstd decoder: {}", e))
                })?;
                Box::new(decoder)
            }
        };

        Ok(Archive::new(reader))
    }

    fn unpack_entry<R: Read>(
        entry: &mut Entry<'_, R>,
        meta: &ArchiveEntry,
        root: &Path,
        rel: &str,
        flags: ExtractFlags,
    ) -> io::Result<()> {
        let dest = safe_join(root, rel)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if flags.unlink && !meta.is_dir() {
            if let Ok(existing) = fs::symlink_metadata(&dest) {
                if !existing.is_dir() {
                    fs::remove_file(&dest)?;
                }
            }
        }

        match (meta.kind, meta.link_target.as_deref()) {
            (EntryKind::Hardlink, Some(target)) => {
                fs::hard_link(safe_join(root, target)?, &dest)?;
            }
            _ => {
                entry.unpack(&dest)?;
            }
        }

        Ok(())
    }
}

/// Strip leading `./` and `/` and a trailing `/`
fn normalize_path(raw: &str) -> String {
    let mut path = raw;
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }
    path.trim_end_matches('/').to_string()
}

/// Metadata of a tar entry, `None` for entries that are not files
/// (the archive root, extended headers)
fn entry_metadata<R: Read>(entry: &Entry<'_, R>) -> Result<Option<ArchiveEntry>> {
    let header = entry.header();

    let kind = match header.entry_type() {
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => EntryKind::Regular,
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink,
        EntryType::Link => EntryKind::Hardlink,
        EntryType::Char => EntryKind::CharDevice,
        EntryType::Block => EntryKind::BlockDevice,
        EntryType::Fifo => EntryKind::Fifo,
        _ => return Ok(None),
    };

    let path = normalize_path(&String::from_utf8_lossy(&entry.path_bytes()));
    if path.is_empty() || path == "." {
        return Ok(None);
    }

    let header_err = |what: &str, e: io::Error| {
        Error::Archive(format!("Failed to get {} of {}: {}", what, path, e))
    };
    let mode = header.mode().map_err(|e| header_err("mode", e))? & 0o7777;
    let uid = header.uid().map_err(|e| header_err("uid", e))?;
    let gid = header.gid().map_err(|e| header_err("gid", e))?;
    let size = header.size().map_err(|e| header_err("size", e))?;

    let device = match kind {
        EntryKind::CharDevice | EntryKind::BlockDevice => {
            let major = header.device_major().map_err(|e| header_err("device", e))?;
            let minor = header.device_minor().map_err(|e| header_err("device", e))?;
            major.zip(minor)
        }
        _ => None,
    };

    let link_target = entry.link_name_bytes().map(|bytes| {
        let target = String::from_utf8_lossy(&bytes).into_owned();
        if kind == EntryKind::Hardlink {
            normalize_path(&target)
        } else {
            target
        }
    });

    Ok(Some(ArchiveEntry {
        path,
        kind,
        mode: kind.type_bits() | mode,
        uid: uid as u32,
        gid: gid as u32,
        size,
        link_target,
        device,
    }))
}

impl PackageArchive for TarPackage {
    fn path(&self) -> &Path {
        &self.package_path
    }

    fn manifest(&self) -> Result<Vec<ArchiveEntry>> {
        debug!("Reading manifest of {}", self.package_path.display());

        let mut archive = self.open_archive()?;
        let mut entries = Vec::new();

        for entry in archive
            .entries()
            .map_err(|e| Error::Archive(format!("Failed to read archive entries: {}", e)))?
        {
            let entry =
                entry.map_err(|e| Error::Archive(format!("Failed to read archive entry: {}", e)))?;

            if let Some(meta) = entry_metadata(&entry)? {
                entries.push(meta);
            }
        }

        debug!("Manifest of {} has {} entries", self.package_path.display(), entries.len());
        Ok(entries)
    }

    fn extract(
        &self,
        root: &Path,
        flags: ExtractFlags,
        plan: &mut dyn FnMut(usize, &ArchiveEntry) -> Destination,
    ) -> Result<ExtractReport> {
        let mut archive = self.open_archive()?;
        archive.set_preserve_permissions(flags.preserve_perms);
        archive.set_preserve_ownerships(flags.preserve_owner);
        archive.set_overwrite(true);
        archive.set_unpack_xattrs(false);

        let mut report = ExtractReport::default();
        let mut index = 0;

        for entry in archive
            .entries()
            .map_err(|e| Error::Archive(format!("Failed to read archive entries: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::Archive(format!("Failed to read archive entry: {}", e)))?;

            let Some(meta) = entry_metadata(&entry)? else {
                continue;
            };

            let destination = plan(index, &meta);
            index += 1;

            let (rel, rejected) = match destination {
                Destination::Skip => {
                    report.skipped += 1;
                    continue;
                }
                Destination::Install(rel) => (rel, false),
                Destination::Reject(rel) => (rel, true),
            };

            match Self::unpack_entry(&mut entry, &meta, root, &rel, flags) {
                Ok(()) if rejected => report.rejected.push(meta.archive_path()),
                Ok(()) => report.installed += 1,
                Err(e) => {
                    warn!("Failed to extract {}: {}", root.join(&rel).display(), e);
                    report.failed.push(ExtractFailure {
                        path: rel,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            "Extracted {}: {} installed, {} rejected, {} skipped, {} failed",
            self.package_path.display(),
            report.installed,
            report.rejected.len(),
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{S_IFDIR, S_IFLNK, S_IFREG};
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn build_archive(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder.append_data(&mut header, "./usr/", io::empty()).unwrap();

        let data = b"#!/bin/sh\necho hi\n";
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o755);
        header.set_size(data.len() as u64);
        builder.append_data(&mut header, "usr/hello", &data[..]).unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        header.set_link_name("hello").unwrap();
        builder.append_data(&mut header, "usr/hi", io::empty()).unwrap();

        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_compression_detection() {
        assert_eq!(
            TarPackage::detect_compression(Path::new("a#1.pkg.tar.gz")).unwrap(),
            CompressionFormat::Gzip
        );
        assert_eq!(
            TarPackage::detect_compression(Path::new("a#1.pkg.tar.xz")).unwrap(),
            CompressionFormat::Xz
        );
        assert_eq!(
            TarPackage::detect_compression(Path::new("a#1.pkg.tar.zst")).unwrap(),
            CompressionFormat::Zstd
        );
        assert!(TarPackage::detect_compression(Path::new("a#1.rpm")).is_err());
        assert!(TarPackage::detect_compression(Path::new("a#1.tgz")).is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./usr/bin/"), "usr/bin");
        assert_eq!(normalize_path("/etc/fstab"), "etc/fstab");
        assert_eq!(normalize_path("./"), "");
    }

    #[test]
    fn test_manifest_order_and_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_archive(dir.path(), "hello#1.0.pkg.tar.gz");
        let package = TarPackage::open(&path).unwrap();

        let manifest = package.manifest().unwrap();
        assert_eq!(manifest.len(), 3);

        assert_eq!(manifest[0].path, "usr");
        assert_eq!(manifest[0].archive_path(), "usr/");
        assert_eq!(manifest[0].mode, S_IFDIR | 0o755);

        assert_eq!(manifest[1].path, "usr/hello");
        assert_eq!(manifest[1].mode, S_IFREG | 0o755);
        assert_eq!(manifest[1].size, 18);

        assert_eq!(manifest[2].kind, EntryKind::Symlink);
        assert_eq!(manifest[2].mode & S_IFLNK, S_IFLNK);
        assert_eq!(manifest[2].link_target.as_deref(), Some("hello"));
    }

    #[test]
    fn test_extract_follows_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_archive(dir.path(), "hello#1.0.pkg.tar.gz");
        let root = tempfile::tempdir().unwrap();
        let package = TarPackage::open(&path).unwrap();

        let flags = ExtractFlags {
            preserve_owner: false,
            ..ExtractFlags::default()
        };
        let mut visited = Vec::new();
        let report = package
            .extract(root.path(), flags, &mut |index, entry| {
                visited.push(index);
                match entry.path.as_str() {
                    "usr/hi" => Destination::Skip,
                    "usr/hello" => Destination::Reject(format!("quarantine/{}", entry.path)),
                    other => Destination::Install(other.to_string()),
                }
            })
            .unwrap();

        assert_eq!(visited, vec![0, 1, 2]);
        assert_eq!(report.installed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rejected, vec!["usr/hello".to_string()]);
        assert!(report.failed.is_empty());

        assert!(root.path().join("usr").is_dir());
        assert!(root.path().join("quarantine/usr/hello").is_file());
        assert!(!root.path().join("usr/hello").exists());
    }

    #[test]
    fn test_extract_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_archive(dir.path(), "hello#1.0.pkg.tar.gz");
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("usr")).unwrap();
        fs::write(root.path().join("usr/hello"), b"old").unwrap();

        let package = TarPackage::open(&path).unwrap();
        let flags = ExtractFlags {
            preserve_owner: false,
            ..ExtractFlags::default()
        };
        let report = package
            .extract(root.path(), flags, &mut |_, entry| {
                Destination::Install(entry.path.clone())
            })
            .unwrap();

        assert_eq!(report.installed, 3);
        assert_eq!(
            fs::read_to_string(root.path().join("usr/hello")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
        assert_eq!(
            fs::read_link(root.path().join("usr/hi")).unwrap(),
            PathBuf::from("hello")
        );
    }

    #[test]
    fn test_open_missing_archive() {
        let result = TarPackage::open("/nonexistent/a#1.pkg.tar.gz");
        assert!(matches!(result.unwrap_err(), Error::Archive(_)));
    }
}
