// src/lib.rs

//! pkgcore - tarball package manager core
//!
//! Installs and removes `<name>#<version>.pkg.tar.gz` packages below an
//! install root, tracking which package owns which file in a flat-file
//! database.
//!
//! # Architecture
//!
//! - Flat-file database: one text file, rewritten atomically on every commit
//! - Conflict detection: every file of an incoming package is checked
//!   against the database, the version it replaces and the live filesystem
//! - Rules: `etc/pkgadd.conf` decides which files are installed and which
//!   upgraded files are set aside instead of overwritten
//! - Commit before extract: the database is durable before any file is
//!   written

pub mod config;
pub mod conflict;
pub mod db;
mod error;
pub mod filesystem;
pub mod intersect;
pub mod packages;
pub mod query;
pub mod rules;
pub mod transaction;

pub use error::{Error, Result};
