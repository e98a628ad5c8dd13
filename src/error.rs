//! Typed error taxonomy for the filter and decoder binaries.
//!
//! Named variants let the CLIs match on a specific kind to choose an exit
//! code, while `thiserror`'s derive still gives each one a clean `Display`.

use thiserror::Error;

/// Why a single configuration key/value pair was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigReason {
    #[error("unrecognized option key")]
    UnknownKey,
    #[error("expected a boolean, got `{0}`")]
    NotBoolean(String),
    #[error("expected an integer, got `{0}`")]
    NotInteger(String),
    #[error("expected a floating point number, got `{0}`")]
    NotFloat(String),
    #[error("value {0} out of range [{1}, {2}]")]
    IntOutOfRange(i64, i64, i64),
    #[error("value {0} out of range [{1}, {2}]")]
    FloatOutOfRange(f64, f64, f64),
    #[error("`{0}` is not one of: {1}")]
    NotInEnumSet(String, String),
    #[error("the `no`-prefixed form is only valid for boolean keys")]
    NokeyNotBoolean,
    #[error("pt-series and ql-series are mutually exclusive")]
    MutuallyExclusiveSeries,
}

/// A single rejected `key=value` option.
#[derive(Debug, Error, PartialEq)]
#[error("option `{key}`: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub reason: ConfigReason,
}

impl ConfigError {
    pub fn new(key: impl Into<String>, reason: ConfigReason) -> Self {
        Self {
            key: key.into(),
            reason,
        }
    }
}

/// Failure reading a page header or row from a [`crate::reader::RasterReader`].
#[derive(Debug, Error)]
#[error("reader error on page {page:?}: {reason}")]
pub struct ReaderError {
    pub page: Option<u32>,
    pub reason: String,
}

/// Top-level error type returned by the filter pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("row arena ran out of buffer space")]
    OutOfBuffer,

    #[error("raster reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("job cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal decoding problem. Carried inside a [`crate::decoder::DecodeEvent::Error`]
/// rather than aborting the decode loop.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("at byte offset {offset}: {reason}")]
pub struct DecoderError {
    pub offset: usize,
    pub reason: String,
}
