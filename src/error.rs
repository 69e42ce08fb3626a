// src/error.rs

use thiserror::Error;

/// Core error types for pkgcore
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database file missing under the install root
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Another process holds the database lock
    #[error("Database in use: {0}")]
    DatabaseLocked(String),

    /// Install root is missing or not a directory
    #[error("Invalid install root: {0}")]
    InvalidRoot(String),

    /// Archive filename does not follow `<name>#<version><suffix>`
    #[error("'{0}' is not a valid package name")]
    InvalidPackageName(String),

    /// Package is not registered in the database
    #[error("Package \"{0}\" is not installed")]
    PackageNotFound(String),

    /// Malformed line in a rules file
    #[error("{path}: parse error at line {line}: {message}")]
    ConfigParse {
        path: String,
        line: usize,
        message: String,
    },

    /// Rule pattern that is not a valid regular expression
    #[error("{pattern}: invalid regex: {source}")]
    RegexCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Package archive could not be opened or streamed
    #[error("Archive error: {0}")]
    Archive(String),
}

impl Error {
    /// Whether the error must abort the whole process rather than a single
    /// package of a batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::DatabaseNotFound(_)
                | Error::DatabaseLocked(_)
                | Error::InvalidRoot(_)
                | Error::ConfigParse { .. }
                | Error::RegexCompile { .. }
        )
    }
}

/// Result type alias using pkgcore's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_package_errors_are_not_fatal() {
        assert!(!Error::InvalidPackageName("x".to_string()).is_fatal());
        assert!(!Error::PackageNotFound("x".to_string()).is_fatal());
        assert!(!Error::Archive("truncated".to_string()).is_fatal());
    }

    #[test]
    fn test_lock_and_config_errors_are_fatal() {
        assert!(Error::DatabaseLocked("/var/lib/pkg".to_string()).is_fatal());
        let err = Error::ConfigParse {
            path: "etc/pkgadd.conf".to_string(),
            line: 3,
            message: "unknown rule".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "etc/pkgadd.conf: parse error at line 3: unknown rule"
        );
    }
}
