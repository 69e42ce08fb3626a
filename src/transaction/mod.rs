// src/transaction/mod.rs

//! Install and remove transactions
//!
//! An install moves through a fixed sequence of states:
//!
//! ```text
//! START -> MANIFEST_PARSED -> LISTED -> CLASSIFIED -> ABORTED
//!                                                  -> COMMITTED -> EXTRACTED
//! ```
//!
//! The database is written to disk before the filesystem is touched. A crash
//! after the commit leaves the database describing the intended end state
//! (recoverable by reinstalling); a crash before it leaves the previous
//! install intact.

mod install;
mod remove;

pub use install::{install, install_package};
pub use remove::remove;

use crate::config::Config;
use crate::conflict::ConflictReport;
use crate::db::models::ConflictKind;
use crate::packages::{ExtractFlags, ExtractReport};
use std::fmt;
use std::process::Command;
use tracing::{debug, warn};

/// Force flags and extraction behaviour for an install
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Install over DB and FS conflicts
    pub force: bool,
    /// Install over directory mode/ownership conflicts
    pub force_perms: bool,
    pub extract: ExtractFlags,
}

impl InstallOptions {
    /// Blocking kinds in `found` that these options do not override
    pub fn blocked(&self, found: ConflictKind) -> ConflictKind {
        let mut blocked = ConflictKind::NONE;
        if found.contains(ConflictKind::PERM) && !self.force_perms {
            blocked |= ConflictKind::PERM;
        }
        if !self.force {
            blocked |= found.intersection(ConflictKind::DB | ConflictKind::FS);
        }
        blocked
    }
}

/// Phase of an install transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Start,
    ManifestParsed,
    Listed,
    Classified,
    Aborted,
    Committed,
    Extracted,
}

impl InstallState {
    pub fn as_str(&self) -> &str {
        match self {
            InstallState::Start => "start",
            InstallState::ManifestParsed => "manifest-parsed",
            InstallState::Listed => "listed",
            InstallState::Classified => "classified",
            InstallState::Aborted => "aborted",
            InstallState::Committed => "committed",
            InstallState::Extracted => "extracted",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an install that ran to a decision
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub version: String,
    /// Classification of the package files
    pub report: ConflictReport,
    /// Kinds that stopped the install, NONE when it went ahead
    pub blocked: ConflictKind,
    /// Final state: `Aborted` or `Extracted`
    pub state: InstallState,
    /// Whether an earlier version was replaced
    pub upgraded: bool,
    pub extract: ExtractReport,
}

impl InstallOutcome {
    pub fn committed(&self) -> bool {
        self.state == InstallState::Extracted
    }
}

/// Result of a remove
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub name: String,
    pub version: String,
    pub removed: usize,
    /// Paths left on disk because another package still owns them
    pub kept: Vec<String>,
    /// Paths that could not be deleted
    pub failed: Vec<String>,
}

/// Refresh the dynamic linker cache of the install root, if it has a linker
pub(crate) fn run_ldconfig(config: &Config) {
    let ldconfig = config.root.join("sbin/ldconfig");
    if !ldconfig.is_file() {
        debug!("No ldconfig at {}", ldconfig.display());
        return;
    }

    let mut command = Command::new(&ldconfig);
    if config.root != std::path::Path::new("/") {
        command.arg("-r").arg(&config.root);
    }

    match command.status() {
        Ok(status) if status.success() => debug!("Ran {}", ldconfig.display()),
        Ok(status) => warn!("{} exited with {}", ldconfig.display(), status),
        Err(e) => warn!("Failed to run {}: {}", ldconfig.display(), e),
    }
}
