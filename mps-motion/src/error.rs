//! # Error taxonomy
//!
//! Fallible functions in this crate return `anyhow::Result`. Errors that callers may want to tell
//! apart are raised as [`MotionError`] and can be recovered with `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

/// Typed motion tracking errors.
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("invalid threshold: vmin ({vmin}) is larger than vmax ({vmax})")]
    InvalidThreshold { vmin: f64, vmax: f64 },

    #[error("expected flow algorithm to be one of {valid:?}, got {name}")]
    InvalidAlgorithm { name: String, valid: Vec<&'static str> },

    #[error("expected reference frame to be a number or one of [\"min\", \"max\", \"median\", \"mean\"], got {0}")]
    InvalidReference(String),

    #[error("time stamps are required to resolve a time based reference frame")]
    MissingTimeStamps,

    #[error("time stamps must strictly increase, stamp {index} does not")]
    NonIncreasingTimeStamps { index: usize },

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("scale must be in (0, 1], got {0}")]
    InvalidScale(f64),

    #[error("expected unit to be one of [\"pixels\", \"um\"], got {0}")]
    InvalidUnit(String),

    #[error("extent {extent} is not evenly divisible by {divisor}")]
    Indivisible { extent: usize, divisor: usize },

    #[error("expected an array with {expected} dimensions, found {found}")]
    InvalidRank { expected: usize, found: usize },

    #[error("{algorithm} does not support {capability}")]
    Unsupported {
        algorithm: &'static str,
        capability: &'static str,
    },

    #[error("no dense flow provider is available for {algorithm}")]
    CapabilityUnavailable { algorithm: &'static str },

    #[error("frame {frame} failed: {message}")]
    WorkerFailed { frame: usize, message: String },

    #[error("unknown file format: {0:?}")]
    UnknownFormat(PathBuf),
}
