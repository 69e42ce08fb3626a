// src/main.rs

use anyhow::{Result, bail};
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pkgcore::config::Config;
use pkgcore::db::Database;
use pkgcore::packages::PackageName;
use pkgcore::transaction::{self, InstallOptions};
use pkgcore::query;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pkgcore")]
#[command(author, version, about = "Tarball package manager with file conflict detection", long_about = None)]
struct Cli {
    /// Install root directory
    #[arg(short, long, global = true, default_value = "/")]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty package database under the install root
    Init,
    /// Install or upgrade packages
    Add {
        /// Package files (<name>#<version>.pkg.tar.gz)
        #[arg(required = true)]
        packages: Vec<PathBuf>,
        /// Overwrite files owned by other packages or present on disk
        #[arg(short = 'o', long)]
        force_over: bool,
        /// Install over directories with different mode or ownership
        #[arg(short = 'p', long)]
        force_perms: bool,
        /// Same as --force-over --force-perms
        #[arg(short, long)]
        force: bool,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Query the package database
    #[command(group(ArgGroup::new("query").required(true).args(["installed", "list", "owner", "footprint"])))]
    Info {
        /// List installed packages
        #[arg(short, long)]
        installed: bool,
        /// List files of an installed package or a package file
        #[arg(short, long, value_name = "PACKAGE|FILE")]
        list: Option<String>,
        /// Show which packages own paths matching a regular expression
        #[arg(short, long, value_name = "PATTERN")]
        owner: Option<String>,
        /// Print mode, owner/group and path of every entry of a package file
        #[arg(short, long, value_name = "FILE")]
        footprint: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => {
            let config = Config::new(&cli.root)?;
            pkgcore::db::init(&config)?;
            println!("Database initialized at: {}", config.db_file.display());
            Ok(())
        }
        Some(Commands::Add {
            packages,
            force_over,
            force_perms,
            force,
        }) => {
            let options = InstallOptions {
                force: force || force_over,
                force_perms: force || force_perms,
                ..Default::default()
            };
            cmd_add(&cli.root, &packages, options)
        }
        Some(Commands::Remove { names }) => cmd_remove(&cli.root, &names),
        Some(Commands::Info {
            installed,
            list,
            owner,
            footprint,
        }) => {
            if let Some(path) = footprint {
                for line in query::footprint(&path)? {
                    println!("{}", line);
                }
                return Ok(());
            }

            let config = Config::new(&cli.root)?;
            let db = Database::load(&config)?;

            if installed {
                for pkg in query::installed(&db) {
                    println!("{} {}", pkg.name, pkg.version);
                }
            } else if let Some(target) = list {
                let files = if PackageName::is_archive_name(&target) {
                    query::list_archive(Path::new(&target))?
                } else {
                    query::list_package(&db, &target)?
                };
                for file in files {
                    println!("{}", file);
                }
            } else if let Some(pattern) = owner {
                let owners = query::owners(&db, &pattern)?;
                if owners.is_empty() {
                    println!("{}: no owner(s) found", pattern);
                    return Ok(());
                }

                let width = owners.iter().map(|o| o.package.len()).max().unwrap_or(0);
                println!("{:<width$} File", "Package", width = width);
                for o in &owners {
                    println!("{:<width$} {}", o.package, o.path, width = width);
                }
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pkgcore", &mut io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("pkgcore v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pkgcore --help' for usage information");
            Ok(())
        }
    }
}

/// Install packages in order, stopping at the first one with blocking
/// conflicts
fn cmd_add(root: &Path, packages: &[PathBuf], options: InstallOptions) -> Result<()> {
    let config = Config::new(root)?;
    let mut db = Database::open(&config)?;
    let rules = config.load_rules()?;
    let mut failed = 0;

    for path in packages {
        let outcome = match transaction::install(&config, &mut db, &rules, path, options) {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed += 1;
                continue;
            }
        };

        if !outcome.report.is_empty() {
            print!("{}", outcome.report);
        }

        if !outcome.committed() {
            bail!(
                "{}#{}: conflicts found ({}), nothing installed",
                outcome.name,
                outcome.version,
                outcome.blocked
            );
        }

        for failure in &outcome.extract.failed {
            eprintln!("Failed to extract {}: {}", failure.path, failure.reason);
        }

        let verb = if outcome.upgraded { "Upgraded" } else { "Installed" };
        println!("{} {}#{}", verb, outcome.name, outcome.version);
        if !outcome.extract.rejected.is_empty() {
            println!(
                "  {} file(s) rejected to {}",
                outcome.extract.rejected.len(),
                config.reject_dir.display()
            );
        }
    }

    if failed > 0 {
        bail!("{} of {} package(s) not installed", failed, packages.len());
    }
    Ok(())
}

fn cmd_remove(root: &Path, names: &[String]) -> Result<()> {
    let config = Config::new(root)?;
    let mut db = Database::open(&config)?;
    let mut failed = 0;

    for name in names {
        match transaction::remove(&config, &mut db, name) {
            Ok(outcome) => {
                info!(
                    "{} files removed, {} kept",
                    outcome.removed,
                    outcome.kept.len()
                );
                println!("Removed {}#{}", outcome.name, outcome.version);
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                error!("{}: {}", name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} package(s) not removed", failed, names.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_force_flags() {
        let cli = Cli::try_parse_from([
            "pkgcore",
            "--root",
            "/mnt",
            "add",
            "-o",
            "-p",
            "bash#5.2-1.pkg.tar.gz",
            "zlib#1.3-1.pkg.tar.gz",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("/mnt"));
        match cli.command {
            Some(Commands::Add {
                packages,
                force_over,
                force_perms,
                force,
            }) => {
                assert_eq!(packages.len(), 2);
                assert!(force_over);
                assert!(force_perms);
                assert!(!force);
            }
            _ => panic!("expected add command"),
        }
    }

    #[test]
    fn test_info_requires_a_query() {
        assert!(Cli::try_parse_from(["pkgcore", "info"]).is_err());
        assert!(Cli::try_parse_from(["pkgcore", "info", "-i"]).is_ok());
        assert!(Cli::try_parse_from(["pkgcore", "info", "-i", "-o", "bash"]).is_err());
    }

    #[test]
    fn test_parse_info_footprint() {
        let cli = Cli::try_parse_from(["pkgcore", "info", "-f", "bash#5.2-1.pkg.tar.gz"]).unwrap();
        match cli.command {
            Some(Commands::Info { footprint, .. }) => {
                assert_eq!(footprint, Some(PathBuf::from("bash#5.2-1.pkg.tar.gz")));
            }
            _ => panic!("expected info command"),
        }
        assert!(Cli::try_parse_from(["pkgcore", "info", "-f", "a", "-i"]).is_err());
    }

    #[test]
    fn test_root_defaults_to_slash() {
        let cli = Cli::try_parse_from(["pkgcore", "remove", "bash"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/"));
    }
}
