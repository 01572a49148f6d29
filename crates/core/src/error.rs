//! Error types surfaced while loading inputs.
//!
//! Analyses themselves never fail: a missing header or an unresolved call
//! degrades to "no finding". Only module, seed and config loading can error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("failed to read module {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse module: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("dangling {kind} id {id}")]
    Dangling { kind: &'static str, id: u32 },

    #[error("inconsistent module: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("line {line}: argument position must be -1 (return) or >= 1, got {value}")]
    InvalidPosition { line: usize, value: i64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown report section `{0}` (expected ldp, fpu or rfp)")]
    UnknownSection(String),
}
