// src/config.rs

//! On-disk layout below an install root
//!
//! Every path the package manager touches is resolved against the configured
//! root; the process working directory is never changed.

use crate::error::{Error, Result};
use crate::rules::RuleSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Database directory, also the advisory lock target
pub const DB_DIR: &str = "var/lib/pkg";

/// Flat-file package database
pub const DB_FILE: &str = "var/lib/pkg/db";

/// Quarantine for files rejected by upgrade rules
pub const REJECT_DIR: &str = "var/lib/pkg/rejected";

/// Install/upgrade rules
pub const RULES_FILE: &str = "etc/pkgadd.conf";

/// Paths used by a package operation
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub db_dir: PathBuf,
    pub db_file: PathBuf,
    pub reject_dir: PathBuf,
    pub rules_file: PathBuf,
}

impl Config {
    /// Build the layout for `root`, which must be an existing directory
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(Error::InvalidRoot(root.display().to_string()));
        }

        debug!("Using install root {}", root.display());

        Ok(Self {
            db_dir: root.join(DB_DIR),
            db_file: root.join(DB_FILE),
            reject_dir: root.join(REJECT_DIR),
            rules_file: root.join(RULES_FILE),
            root,
        })
    }

    /// Live location of a root-relative package path
    pub fn live_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Read the rules file; a missing file yields an empty rule set
    pub fn load_rules(&self) -> Result<RuleSet> {
        if !self.rules_file.exists() {
            debug!("No rules file at {}", self.rules_file.display());
            return Ok(RuleSet::default());
        }

        RuleSet::from_file(&self.rules_file)
    }
}
