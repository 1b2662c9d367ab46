//! Typed key/value configuration files shared by the runtime and its
//! collaborators.
//!
//! Every file is a two-level store: sections hold keys, keys hold values.
//! Section `""` is the global section and maps onto the top level of the TOML
//! document; every other section becomes a table, so effect file names such as
//! `Bloom.fx` end up as quoted table headers.
//!
//! Types:
//!
//! - `ConfigFile` owns one parsed document plus a modified flag.
//! - `ConfigCache` hands out files keyed by absolute path and flushes the
//!   modified ones back to disk.
//! - `Millis` deserializes durations written either as milliseconds or as
//!   human-readable strings (`"1.5s"`).

mod cache;
mod file;

use std::path::PathBuf;

pub use cache::{absolute_path, ConfigCache};
pub use file::{ConfigFile, Millis, GLOBAL_SECTION};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode value for [{section}] {key}: {source}")]
    Encode {
        section: String,
        key: String,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to serialize configuration {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("refusing to overwrite unreadable configuration {path}")]
    ReadOnly { path: PathBuf },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
