// src/db/format.rs

//! Flat-file database encoding
//!
//! One record per package, packages separated by a blank line:
//!
//! ```text
//! name
//! version
//! path/of/file
//! path/of/directory/
//!
//! ```
//!
//! Only path and directory-ness survive a round trip; mode bits, ownership
//! and conflict marks live in memory only.

use super::models::{Package, S_IFDIR};

/// Decode database text into packages, in file order
pub fn parse(content: &str) -> Vec<Package> {
    let mut packages = Vec::new();
    let mut current: Option<Package> = None;
    let mut line_in_record = 0;

    for line in content.lines() {
        if line.is_empty() {
            if let Some(pkg) = current.take() {
                packages.push(pkg);
            }
            line_in_record = 0;
            continue;
        }

        line_in_record += 1;
        match line_in_record {
            1 => current = Some(Package::new(line.to_string(), String::new())),
            2 => {
                if let Some(pkg) = current.as_mut() {
                    pkg.version = line.to_string();
                }
            }
            _ => {
                if let Some(pkg) = current.as_mut() {
                    match line.strip_suffix('/') {
                        Some(dir) => pkg.add_file(dir.to_string(), S_IFDIR, 0, 0),
                        None => pkg.add_file(line.to_string(), 0, 0, 0),
                    };
                }
            }
        }
    }

    // Tolerate a final record without its terminating blank line
    if let Some(pkg) = current {
        packages.push(pkg);
    }

    packages
}

/// Encode packages in the given order
pub fn render(packages: &[Package]) -> String {
    let mut out = String::new();

    for pkg in packages {
        out.push_str(&pkg.name);
        out.push('\n');
        out.push_str(&pkg.version);
        out.push('\n');
        for file in &pkg.files {
            out.push_str(&file.path);
            if file.is_dir() {
                out.push('/');
            }
            out.push('\n');
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::S_IFREG;

    const SAMPLE: &str = "bash\n5.2\nbin/\nbin/bash\n\nzlib\n1.3\nusr/\nusr/lib/\nusr/lib/libz.so\n\n";

    #[test]
    fn test_parse_records() {
        let packages = parse(SAMPLE);
        assert_eq!(packages.len(), 2);

        assert_eq!(packages[0].name, "bash");
        assert_eq!(packages[0].version, "5.2");
        assert_eq!(packages[0].files.len(), 2);
        assert_eq!(packages[0].files[0].path, "bin");
        assert!(packages[0].files[0].is_dir());
        assert_eq!(packages[0].files[1].path, "bin/bash");
        assert!(!packages[0].files[1].is_dir());
        assert_eq!(packages[0].files[1].package, "bash");

        assert_eq!(packages[1].files[2].path, "usr/lib/libz.so");
    }

    #[test]
    fn test_render_matches_parsed_text() {
        assert_eq!(render(&parse(SAMPLE)), SAMPLE);
    }

    #[test]
    fn test_render_marks_directories() {
        let mut pkg = Package::new("p".to_string(), "1".to_string());
        pkg.add_file("opt".to_string(), S_IFDIR | 0o755, 0, 0);
        pkg.add_file("opt/tool".to_string(), S_IFREG | 0o755, 0, 0);
        assert_eq!(render(&[pkg]), "p\n1\nopt/\nopt/tool\n\n");
    }

    #[test]
    fn test_parse_empty_and_unterminated() {
        assert!(parse("").is_empty());

        let packages = parse("p\n1\nfile");
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].files[0].path, "file");
    }

    #[test]
    fn test_parse_ignores_repeated_paths() {
        let packages = parse("p\n1\nopt/\nopt/x\nopt/x\nopt/\n\n");
        assert_eq!(packages[0].files.len(), 2);
        assert_eq!(render(&packages), "p\n1\nopt/\nopt/x\n\n");
    }

    #[test]
    fn test_package_without_files() {
        let packages = parse("meta\n0.1\n\n");
        assert_eq!(packages.len(), 1);
        assert!(packages[0].files.is_empty());
    }
}
