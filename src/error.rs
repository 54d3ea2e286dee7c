//! Error type shared by the track store and configuration layer.

use crate::track::TrackId;

/// The crate error type.
///
/// Per-frame operations report "not found" and "not applicable" outcomes
/// through `bool`/`Option` returns; this type covers construction,
/// configuration and input data problems.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("track {0} already exists in the track set")]
    DuplicateId(TrackId),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
