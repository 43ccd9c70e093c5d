//! GraphQL config discovery.
//!
//! A folder only gets a language client when a GraphQL config file exists
//! under its config root. Discovery failure is ordinary: the folder stays
//! inert for the session and the reason lands in the log.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Candidate config file names, in precedence order.
///
/// Mirrors the file names graphql-config accepts; the first one present wins.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "graphql.config.json",
    "graphql.config.js",
    "graphql.config.cjs",
    "graphql.config.mjs",
    "graphql.config.ts",
    "graphql.config.toml",
    "graphql.config.yaml",
    "graphql.config.yml",
    ".graphqlrc",
    ".graphqlrc.json",
    ".graphqlrc.js",
    ".graphqlrc.cjs",
    ".graphqlrc.ts",
    ".graphqlrc.toml",
    ".graphqlrc.yaml",
    ".graphqlrc.yml",
];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(
        "no GraphQL config file in {}: expected one of graphql.config.* or .graphqlrc*",
        dir.display()
    )]
    NotFound { dir: PathBuf },
    #[error("cannot scan {}: {source}", dir.display())]
    Unreadable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Locate the GraphQL config file for `dir`.
///
/// An unreadable or missing directory is a discovery failure like any other;
/// the caller downgrades the folder to inert either way.
pub fn discover_config(dir: &Path) -> Result<PathBuf, DiscoveryError> {
    let unreadable = |source| DiscoveryError::Unreadable {
        dir: dir.to_path_buf(),
        source,
    };

    let meta = std::fs::metadata(dir).map_err(unreadable)?;
    if !meta.is_dir() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }

    for name in CONFIG_CANDIDATES {
        let candidate = dir.join(name);
        match candidate.try_exists() {
            Ok(true) if candidate.is_file() => return Ok(candidate),
            Ok(_) => {}
            Err(source) => return Err(unreadable(source)),
        }
    }

    Err(DiscoveryError::NotFound {
        dir: dir.to_path_buf(),
    })
}
