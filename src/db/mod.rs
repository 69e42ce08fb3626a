// src/db/mod.rs

//! Package database
//!
//! This module handles:
//! - Creating the database directory and file under an install root
//! - The advisory lock held for the lifetime of a writing process
//! - Loading the flat file into memory
//! - Atomic write-back (temp file, fsync, rename over)

pub mod format;
pub mod models;

use crate::config::Config;
use crate::error::{Error, Result};
use fs2::FileExt;
use models::{Package, PackageFile};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Initialize an empty database under the configured root
///
/// Creates the database directory and an empty database file. This is
/// idempotent - calling it on an existing database leaves it untouched.
pub fn init(config: &Config) -> Result<()> {
    debug!("Initializing database at: {}", config.db_file.display());

    fs::create_dir_all(&config.db_dir)?;

    if !config.db_file.exists() {
        File::create(&config.db_file)?;
        info!("Database initialized successfully");
    }

    Ok(())
}

/// Exclusive advisory lock on the database directory
///
/// Released when dropped (the descriptor is closed).
#[derive(Debug)]
pub struct DbLock {
    _dir: File,
}

impl DbLock {
    /// Take the lock without blocking
    pub fn acquire(db_dir: &Path) -> Result<Self> {
        let dir = File::open(db_dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::DatabaseNotFound(db_dir.display().to_string()),
            _ => Error::Io(e),
        })?;

        match dir.try_lock_exclusive() {
            Ok(()) => {
                debug!("Locked database directory {}", db_dir.display());
                Ok(Self { _dir: dir })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(Error::DatabaseLocked(db_dir.display().to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Position of a file inside the database: package index, file index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRef {
    pub package: usize,
    pub file: usize,
}

/// In-memory package registry backed by the flat file
#[derive(Debug)]
pub struct Database {
    db_file: PathBuf,
    packages: Vec<Package>,
    lock: Option<DbLock>,
}

impl Database {
    /// Lock the database directory and load the database
    pub fn open(config: &Config) -> Result<Self> {
        let lock = DbLock::acquire(&config.db_dir)?;
        let mut db = Self::load(config)?;
        db.lock = Some(lock);
        Ok(db)
    }

    /// Load the database without locking, for read-only use
    pub fn load(config: &Config) -> Result<Self> {
        let content = fs::read_to_string(&config.db_file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Error::DatabaseNotFound(config.db_file.display().to_string())
            }
            _ => Error::Io(e),
        })?;

        let packages = format::parse(&content);
        debug!(
            "Loaded {} packages from {}",
            packages.len(),
            config.db_file.display()
        );

        Ok(Self {
            db_file: config.db_file.clone(),
            packages,
            lock: None,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn packages_mut(&mut self) -> &mut [Package] {
        &mut self.packages
    }

    /// Find a package by name
    pub fn find(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|pkg| pkg.name == name)
    }

    /// Index of a package by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|pkg| pkg.name == name)
    }

    /// Add a package, replacing one with the same name
    pub fn insert(&mut self, pkg: Package) -> Option<Package> {
        match self.position(&pkg.name) {
            Some(index) => Some(std::mem::replace(&mut self.packages[index], pkg)),
            None => {
                self.packages.push(pkg);
                None
            }
        }
    }

    /// Remove a package by name
    pub fn remove(&mut self, name: &str) -> Option<Package> {
        let index = self.position(name)?;
        Some(self.packages.remove(index))
    }

    /// Every file of every package except `skip`, ordered by path
    pub fn sorted_file_refs(&self, skip: Option<usize>) -> Vec<FileRef> {
        let mut refs: Vec<FileRef> = self
            .packages
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != skip)
            .flat_map(|(package, pkg)| {
                (0..pkg.files.len()).map(move |file| FileRef { package, file })
            })
            .collect();

        refs.sort_by(|a, b| self.file(*a).path.cmp(&self.file(*b).path));
        refs
    }

    pub fn file(&self, at: FileRef) -> &PackageFile {
        &self.packages[at.package].files[at.file]
    }

    pub fn file_mut(&mut self, at: FileRef) -> &mut PackageFile {
        &mut self.packages[at.package].files[at.file]
    }

    /// Reset conflict marks on every package
    pub fn clear_conflicts(&mut self) {
        for pkg in &mut self.packages {
            pkg.clear_conflicts();
        }
    }

    /// Write the database back, sorted by package name
    ///
    /// The new content goes to a temporary file in the database directory,
    /// is fsynced, then renamed over the old file.
    pub fn commit(&mut self) -> Result<()> {
        self.packages.sort_by(|a, b| a.name.cmp(&b.name));

        let dir = self.db_file.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(format::render(&self.packages).as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.db_file).map_err(|e| Error::Io(e.error))?;

        // Persist the rename itself; not every filesystem supports this
        if let Err(e) = File::open(dir).and_then(|dir| dir.sync_all()) {
            debug!("Can't sync {}: {}", dir.display(), e);
        }

        info!(
            "Committed database ({} packages) to {}",
            self.packages.len(),
            self.db_file.display()
        );
        Ok(())
    }
}
