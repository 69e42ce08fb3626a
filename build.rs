// build.rs

use clap::{Arg, ArgAction, ArgGroup, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .default_value("/")
        .global(true)
        .help("Install root directory")
}

fn build_cli() -> Command {
    Command::new("pkgcore")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgcore Contributors")
        .about("Tarball package manager with file conflict detection")
        .subcommand_required(false)
        .arg(root_arg())
        .subcommand(Command::new("init").about("Create an empty package database under the install root"))
        .subcommand(
            Command::new("add")
                .about("Install or upgrade packages")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package files (<name>#<version>.pkg.tar.gz)"),
                )
                .arg(
                    Arg::new("force_over")
                        .short('o')
                        .long("force-over")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite files owned by other packages or present on disk"),
                )
                .arg(
                    Arg::new("force_perms")
                        .short('p')
                        .long("force-perms")
                        .action(ArgAction::SetTrue)
                        .help("Install over directories with different mode or ownership"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Same as --force-over --force-perms"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Query the package database")
                .arg(
                    Arg::new("installed")
                        .short('i')
                        .long("installed")
                        .action(ArgAction::SetTrue)
                        .help("List installed packages"),
                )
                .arg(
                    Arg::new("list")
                        .short('l')
                        .long("list")
                        .value_name("PACKAGE|FILE")
                        .help("List files of an installed package or a package file"),
                )
                .arg(
                    Arg::new("owner")
                        .short('o')
                        .long("owner")
                        .value_name("PATTERN")
                        .help("Show which packages own paths matching a regular expression"),
                )
                .arg(
                    Arg::new("footprint")
                        .short('f')
                        .long("footprint")
                        .value_name("FILE")
                        .help("Print mode, owner/group and path of every entry of a package file"),
                )
                .group(
                    ArgGroup::new("query")
                        .required(true)
                        .args(["installed", "list", "owner", "footprint"]),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgcore.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
