// src/transaction/install.rs

use super::{InstallOptions, InstallOutcome, InstallState, run_ldconfig};
use crate::config::{Config, REJECT_DIR};
use crate::conflict::{self, ConflictReport};
use crate::db::Database;
use crate::db::models::{ConflictKind, Package};
use crate::error::Result;
use crate::filesystem;
use crate::packages::{ArchiveEntry, Destination, PackageArchive, PackageName, TarPackage};
use crate::rules::{RuleClass, RuleSet};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Install a package archive, upgrading an installed package of the same name
///
/// The name and version come from the archive filename.
pub fn install(
    config: &Config,
    db: &mut Database,
    rules: &RuleSet,
    path: &Path,
    options: InstallOptions,
) -> Result<InstallOutcome> {
    let name = PackageName::from_path(path)?;
    let archive = TarPackage::open(path)?;
    install_package(config, db, rules, &archive, &name, options)
}

/// Install `archive` as package `name`
///
/// Returns an `Aborted` outcome, leaving the database and filesystem
/// untouched, when conflicts are found that `options` does not force. An
/// error after the database commit (the archive can no longer be read)
/// leaves the new package registered.
pub fn install_package<A: PackageArchive + ?Sized>(
    config: &Config,
    db: &mut Database,
    rules: &RuleSet,
    archive: &A,
    name: &PackageName,
    options: InstallOptions,
) -> Result<InstallOutcome> {
    let mut state = InstallState::Start;
    info!("Installing {} from {}", name, archive.path().display());
    advance(name, &mut state, InstallState::ManifestParsed);

    let manifest = archive.manifest()?;
    let mut pkg = Package::new(name.name.clone(), name.version.clone());
    // Manifest index -> file index; repeated entries share a record
    let file_index: Vec<usize> = manifest
        .iter()
        .map(|entry| pkg.add_file(entry.path.clone(), entry.mode, entry.uid, entry.gid))
        .collect();
    advance(name, &mut state, InstallState::Listed);

    let found = conflict::classify(db, &mut pkg, &config.root);
    let report = ConflictReport::from_package(&pkg, &config.root);
    advance(name, &mut state, InstallState::Classified);

    let blocked = options.blocked(found);
    if !blocked.is_none() {
        db.clear_conflicts();
        advance(name, &mut state, InstallState::Aborted);
        warn!("{} not installed, unresolved conflicts: {}", name, blocked);

        return Ok(InstallOutcome {
            name: pkg.name,
            version: pkg.version,
            report,
            blocked,
            state,
            upgraded: false,
            extract: Default::default(),
        });
    }

    let old = commit(db, &pkg)?;
    advance(name, &mut state, InstallState::Committed);

    if let Some(old) = &old {
        remove_stale_files(config, old);
    }

    let mut plan = |index: usize, entry: &ArchiveEntry| {
        let conflict = file_index
            .get(index)
            .and_then(|&file| pkg.files.get(file))
            .map(|file| file.conflict)
            .unwrap_or(ConflictKind::NONE);
        destination(config, rules, entry, conflict)
    };
    let extract = archive.extract(&config.root, options.extract, &mut plan)?;
    advance(name, &mut state, InstallState::Extracted);

    run_ldconfig(config);

    match &old {
        Some(old) => info!("Upgraded {} from {}", name, old.version),
        None => info!("Installed {}", name),
    }

    Ok(InstallOutcome {
        name: pkg.name,
        version: pkg.version,
        report,
        blocked,
        state,
        upgraded: old.is_some(),
        extract,
    })
}

fn advance(name: &PackageName, state: &mut InstallState, next: InstallState) {
    debug!("{}: {} -> {}", name, state, next);
    *state = next;
}

/// Replace the installed record of the package and write the database
///
/// Entries of other packages for paths this install forces over are
/// dropped so every path keeps a single owner. A path whose DB mark gave
/// way to SELF stays with its other owners. Returns the replaced record,
/// with its classification marks.
fn commit(db: &mut Database, pkg: &Package) -> Result<Option<Package>> {
    let old = db.remove(&pkg.name);

    let forced: HashSet<&str> = pkg
        .files
        .iter()
        .filter(|file| file.conflict == ConflictKind::DB)
        .map(|file| file.path.as_str())
        .collect();

    for other in db.packages_mut() {
        let before = other.files.len();
        other.files.retain(|file| {
            file.conflict != ConflictKind::DB || !forced.contains(file.path.as_str())
        });
        let taken = before - other.files.len();
        if taken > 0 {
            info!("{} takes over {} files from {}", pkg.name, taken, other.name);
        }
    }

    let mut record = pkg.clone();
    record.clear_conflicts();
    db.insert(record);
    db.clear_conflicts();
    db.commit()?;

    Ok(old)
}

/// Delete files of the replaced version that the new version does not
/// ship and no other package owns, children before parents
fn remove_stale_files(config: &Config, old: &Package) {
    for file in old.files.iter().rev() {
        if !file.conflict.is_none() {
            continue;
        }

        let path = config.live_path(&file.path);
        debug!("removing {}", path.display());
        if let Err(e) = filesystem::remove_path(&path) {
            warn!("Can't remove {}: {}", path.display(), e);
        }
    }
}

/// Decide where an archive entry goes
///
/// Rules are matched against the path as stored in the archive, with a
/// trailing `/` on directories.
fn destination(
    config: &Config,
    rules: &RuleSet,
    entry: &ArchiveEntry,
    conflict: ConflictKind,
) -> Destination {
    let archive_path = entry.archive_path();

    if !rules.evaluate(RuleClass::Install, &archive_path) {
        debug!("skipping {}", archive_path);
        return Destination::Skip;
    }

    if !conflict.is_none() && !rules.evaluate(RuleClass::Upgrade, &archive_path) {
        let target = format!("{}/{}", REJECT_DIR, entry.path);
        if entry.is_dir() {
            debug!("rejecting {} to {}", archive_path, target);
        } else {
            warn!("rejecting {}", archive_path);
            debug!("to {}", config.live_path(&target).display());
        }
        return Destination::Reject(target);
    }

    debug!("installing {}", config.live_path(&entry.path).display());
    Destination::Install(entry.path.clone())
}
