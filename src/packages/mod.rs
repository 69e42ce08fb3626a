// src/packages/mod.rs

//! Package archive support
//!
//! Packages are compressed tarballs named `<name>#<version>.pkg.tar.gz`.
//! Archive readers implement the `PackageArchive` trait.

pub mod name;
pub mod tarball;
pub mod traits;

pub use name::PackageName;
pub use tarball::TarPackage;
pub use traits::{ArchiveEntry, Destination, EntryKind, ExtractFlags, ExtractReport, PackageArchive};
