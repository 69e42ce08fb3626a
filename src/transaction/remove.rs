// src/transaction/remove.rs

use super::{RemoveOutcome, run_ldconfig};
use crate::config::Config;
use crate::db::Database;
use crate::db::models::ConflictKind;
use crate::error::{Error, Result};
use crate::filesystem;
use crate::intersect::intersect_uniq;
use tracing::{debug, info, warn};

/// Remove an installed package
///
/// Files still owned by another package (typically shared directories) stay
/// on disk. Everything else is deleted in reverse manifest order so
/// directories are emptied before they are removed. Deletion failures are
/// logged; the package record is dropped and the database committed either
/// way.
pub fn remove(config: &Config, db: &mut Database, name: &str) -> Result<RemoveOutcome> {
    let mut pkg = db
        .remove(name)
        .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;

    let db_files = db.sorted_file_refs(None);
    let own_files = pkg.sorted_file_indexes();

    let mut referenced = Vec::new();
    intersect_uniq(
        &own_files,
        &db_files,
        |&own, &other| pkg.files[own].path.cmp(&db.file(other).path),
        |&own, _| referenced.push(own),
        |_| {},
    );
    for own in referenced {
        pkg.files[own].conflict = ConflictKind::REF;
    }

    let mut outcome = RemoveOutcome {
        name: pkg.name.clone(),
        version: pkg.version.clone(),
        ..Default::default()
    };

    for file in pkg.files.iter().rev() {
        if file.conflict == ConflictKind::REF {
            debug!("keeping {}", file.path);
            outcome.kept.push(file.path.clone());
            continue;
        }

        let path = config.live_path(&file.path);
        debug!("removing {}", path.display());
        match filesystem::remove_path(&path) {
            Ok(()) => outcome.removed += 1,
            Err(e) => {
                warn!("Can't remove {}: {}", path.display(), e);
                outcome.failed.push(file.path.clone());
            }
        }
    }

    db.commit()?;
    run_ldconfig(config);

    info!("Removed {}#{}", outcome.name, outcome.version);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Package, S_IFDIR, S_IFREG};
    use std::fs;

    fn package(name: &str, paths: &[&str]) -> Package {
        let mut pkg = Package::new(name.to_string(), "1".to_string());
        for path in paths {
            match path.strip_suffix('/') {
                Some(dir) => pkg.add_file(dir.to_string(), S_IFDIR | 0o755, 0, 0),
                None => pkg.add_file(path.to_string(), S_IFREG | 0o644, 0, 0),
            };
        }
        pkg
    }

    #[test]
    fn test_remove_keeps_shared_directories() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::new(root.path()).unwrap();
        crate::db::init(&config).unwrap();
        let mut db = Database::open(&config).unwrap();

        db.insert(package("p", &["usr/", "usr/lib/", "usr/lib/p/", "usr/lib/p/libp.so"]));
        db.insert(package("q", &["usr/", "usr/lib/", "usr/lib/p/", "usr/lib/p/libq.so"]));
        db.commit().unwrap();

        fs::create_dir_all(root.path().join("usr/lib/p")).unwrap();
        fs::write(root.path().join("usr/lib/p/libp.so"), b"p").unwrap();
        fs::write(root.path().join("usr/lib/p/libq.so"), b"q").unwrap();

        let outcome = remove(&config, &mut db, "p").unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.kept, vec!["usr/lib/p", "usr/lib", "usr"]);
        assert!(outcome.failed.is_empty());

        assert!(!root.path().join("usr/lib/p/libp.so").exists());
        assert!(root.path().join("usr/lib/p/libq.so").exists());

        let reloaded = Database::load(&config).unwrap();
        assert!(reloaded.find("p").is_none());
        assert_eq!(reloaded.find("q").unwrap().files.len(), 4);
    }

    #[test]
    fn test_remove_unknown_package() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::new(root.path()).unwrap();
        crate::db::init(&config).unwrap();
        let mut db = Database::open(&config).unwrap();

        let result = remove(&config, &mut db, "ghost");
        assert!(matches!(result, Err(Error::PackageNotFound(_))));
    }

    #[test]
    fn test_remove_missing_files_is_best_effort() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::new(root.path()).unwrap();
        crate::db::init(&config).unwrap();
        let mut db = Database::open(&config).unwrap();
        db.insert(package("p", &["opt/", "opt/gone"]));
        fs::create_dir(root.path().join("opt")).unwrap();

        let outcome = remove(&config, &mut db, "p").unwrap();
        assert_eq!(outcome.failed, vec!["opt/gone"]);
        assert_eq!(outcome.removed, 1);
        assert!(!root.path().join("opt").exists());
        assert!(Database::load(&config).unwrap().packages().is_empty());
    }
}
