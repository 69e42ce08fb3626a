// src/conflict.rs

//! File conflict detection
//!
//! Classifies every file of a package about to be installed against the
//! database, the installed version of the same package (if any) and the live
//! filesystem. Passes run in a fixed order and later passes may re-mark
//! files annotated by earlier ones:
//!
//! 1. DB: non-directory paths already owned by another package
//! 2. SELF: paths shared with the installed version being replaced
//! 3. REF: old paths still owned by another package, kept on upgrade
//! 4. FS: live files not accounted for, directory mode/owner mismatches
//!
//! Only DB, FS and PERM block a commit; SELF and REF are informational.

use crate::db::models::{
    ConflictKind, Package, S_IFLNK, S_IFMT, is_dir_mode, is_symlink_mode,
};
use crate::db::{Database, FileRef};
use crate::filesystem::{self, LiveStat};
use crate::intersect::intersect_uniq;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Annotate `new_pkg` (and the database entries it collides with) and
/// return the blocking conflict kinds found
///
/// The installed package with the same name, if any, is treated as the old
/// version being upgraded. Marks left on database entries must be cleared
/// by the caller if the install does not go ahead.
pub fn classify(db: &mut Database, new_pkg: &mut Package, root: &Path) -> ConflictKind {
    let old = db.position(&new_pkg.name);
    let db_files = db.sorted_file_refs(old);
    let new_files = new_pkg.sorted_file_indexes();

    mark_db_conflicts(db, new_pkg, &new_files, &db_files);

    if let Some(old) = old {
        let old_files = db.packages()[old].sorted_file_indexes();
        mark_self_conflicts(db, new_pkg, old, &new_files, &old_files);
        mark_references(db, old, &old_files, &db_files);
    }

    check_filesystem(new_pkg, root);

    let found = new_pkg.conflicts().intersection(ConflictKind::BLOCKING);
    debug!("Conflicts for {}#{}: {}", new_pkg.name, new_pkg.version, found);
    found
}

fn mark_db_conflicts(
    db: &mut Database,
    new_pkg: &mut Package,
    new_files: &[usize],
    db_files: &[FileRef],
) {
    let mut hits = Vec::new();
    intersect_uniq(
        new_files,
        db_files,
        |&n, &r| new_pkg.files[n].path.cmp(&db.file(r).path),
        |&n, &r| {
            // Shared directories are normal; only non-directories collide
            if !new_pkg.files[n].is_dir() {
                hits.push((n, r));
            }
        },
        |_| {},
    );

    for (n, r) in hits {
        debug!("db {}", new_pkg.files[n].path);
        new_pkg.files[n].conflict = ConflictKind::DB;
        db.file_mut(r).conflict = ConflictKind::DB;
    }
}

fn mark_self_conflicts(
    db: &mut Database,
    new_pkg: &mut Package,
    old: usize,
    new_files: &[usize],
    old_files: &[usize],
) {
    let old_pkg = &db.packages()[old];
    let mut hits = Vec::new();
    intersect_uniq(
        new_files,
        old_files,
        |&n, &o| new_pkg.files[n].path.cmp(&old_pkg.files[o].path),
        |&n, &o| hits.push((n, o)),
        |_| {},
    );

    for (n, o) in hits {
        debug!("self {}", new_pkg.files[n].path);
        new_pkg.files[n].conflict = ConflictKind::SELF;
        db.file_mut(FileRef { package: old, file: o }).conflict = ConflictKind::SELF;
    }
}

fn mark_references(db: &mut Database, old: usize, old_files: &[usize], db_files: &[FileRef]) {
    let mut hits = Vec::new();
    intersect_uniq(
        old_files,
        db_files,
        |&o, &r| db.packages()[old].files[o].path.cmp(&db.file(r).path),
        |&o, _| hits.push(o),
        |_| {},
    );

    for o in hits {
        let file = db.file_mut(FileRef { package: old, file: o });
        debug!("ref {}", file.path);
        file.conflict = ConflictKind::REF;
    }
}

fn check_filesystem(new_pkg: &mut Package, root: &Path) {
    for file in &mut new_pkg.files {
        let live_path = root.join(&file.path);

        let Some(live) = filesystem::lstat(&live_path) else {
            // Nothing to overwrite any more
            if file.conflict == ConflictKind::SELF {
                file.conflict = ConflictKind::NONE;
            }
            continue;
        };

        if file.is_dir() {
            if is_symlink_mode(live.mode) {
                match filesystem::stat(&live_path) {
                    Some(target) if is_dir_mode(target.mode) => {
                        debug!("{} stored as symlink", live_path.display());
                        file.mode = (file.mode & !S_IFMT) | S_IFLNK;
                    }
                    _ => file.conflict = ConflictKind::PERM,
                }
                continue;
            }

            if file.conflict == ConflictKind::SELF {
                continue;
            }

            if file.mode != live.mode || file.uid != live.uid || file.gid != live.gid {
                debug!("perm {}", file.path);
                file.conflict = ConflictKind::PERM;
            }
        } else if file.conflict != ConflictKind::DB && file.conflict != ConflictKind::SELF {
            debug!("fs {}", file.path);
            file.conflict = ConflictKind::FS;
        }
    }
}

/// Directory whose live mode or ownership differs from the package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermConflict {
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Live state, `None` if it could not be read
    pub live: Option<LiveStat>,
}

/// Human-readable summary of a classified package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// Blocking kinds present
    pub kinds: ConflictKind,
    pub db: Vec<String>,
    pub fs: Vec<String>,
    pub perm: Vec<PermConflict>,
    /// Paths overwritten in place by an upgrade
    pub upgraded: Vec<String>,
}

impl ConflictReport {
    pub fn from_package(pkg: &Package, root: &Path) -> Self {
        let mut report = Self::default();

        for file in &pkg.files {
            match file.conflict {
                ConflictKind::DB => report.db.push(file.path.clone()),
                ConflictKind::FS => report.fs.push(file.path.clone()),
                ConflictKind::PERM => report.perm.push(PermConflict {
                    path: file.path.clone(),
                    mode: file.mode,
                    uid: file.uid,
                    gid: file.gid,
                    live: filesystem::lstat(&root.join(&file.path)),
                }),
                ConflictKind::SELF => report.upgraded.push(file.path.clone()),
                _ => continue,
            }
        }

        report.kinds = pkg.conflicts().intersection(ConflictKind::BLOCKING);
        report
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_none()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.db.is_empty() {
            writeln!(f, "Files already registered in database:")?;
            for path in &self.db {
                writeln!(f, "{}", path)?;
            }
            writeln!(f)?;
        }

        if !self.fs.is_empty() {
            writeln!(f, "Files already present on filesystem:")?;
            for path in &self.fs {
                writeln!(f, "{}", path)?;
            }
            writeln!(f)?;
        }

        if !self.perm.is_empty() {
            writeln!(f, "Directories with changed mode or ownership:")?;
            for conflict in &self.perm {
                writeln!(
                    f,
                    "{:06o} {}/{} {}",
                    conflict.mode, conflict.uid, conflict.gid, conflict.path
                )?;
                match conflict.live {
                    Some(live) => writeln!(
                        f,
                        "{:06o} {}/{} /{}",
                        live.mode, live.uid, live.gid, conflict.path
                    )?,
                    None => writeln!(f, "(unreadable) /{}", conflict.path)?,
                }
                writeln!(f)?;
            }
        }

        Ok(())
    }
}
