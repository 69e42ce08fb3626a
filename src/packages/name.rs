// src/packages/name.rs

//! Package identity from an archive filename: `<name>#<version><suffix>`

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;

/// Canonical package archive suffix
pub const PKG_EXT: &str = ".pkg.tar.gz";

/// All accepted archive suffixes
pub const PKG_SUFFIXES: [&str; 3] = [PKG_EXT, ".pkg.tar.xz", ".pkg.tar.zst"];

/// Name and version parsed from an archive filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName {
    pub name: String,
    pub version: String,
}

impl PackageName {
    /// Parse the base filename of `path`
    ///
    /// The stem (filename minus suffix) must be at least three characters
    /// and contain exactly one `#` with something on both sides.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let invalid = || Error::InvalidPackageName(path.display().to_string());

        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(invalid)?;

        let stem = PKG_SUFFIXES
            .iter()
            .find_map(|suffix| filename.strip_suffix(suffix))
            .ok_or_else(invalid)?;

        if stem.len() < 3 {
            return Err(invalid());
        }

        let (name, version) = stem.split_once('#').ok_or_else(invalid)?;
        if name.is_empty() || version.is_empty() || version.contains('#') {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Whether an argument names a package archive rather than an
    /// installed package
    pub fn is_archive_name(s: &str) -> bool {
        PKG_SUFFIXES.iter().any(|suffix| s.ends_with(suffix))
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.version)
    }
}
