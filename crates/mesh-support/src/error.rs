// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler.
#![allow(unused_assignments)]

//! Error types for support sampling with rich diagnostics.
//!
//! Only configuration and input problems are errors. A surface point whose
//! thickness cannot be measured is not an error: it carries the
//! [`NO_WIDTH`](crate::width::NO_WIDTH) sentinel and is skipped downstream.
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `SUPPORT-XXXX`:
//! - `SUPPORT-1xxx`: Configuration errors (ranges, thresholds, directions)
//! - `SUPPORT-2xxx`: Mesh input errors (indices, coordinates)
//! - `SUPPORT-3xxx`: I/O errors (debug export only)

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for support sampling operations.
pub type SupportResult<T> = Result<T, SupportError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportErrorCode {
    /// SUPPORT-1001: A `[min, max]` range has `max <= min`
    InvalidRange = 1001,
    /// SUPPORT-1002: A scalar parameter is out of its domain
    InvalidParameter = 1002,
    /// SUPPORT-1003: No ray directions configured
    EmptyDirections = 1003,

    /// SUPPORT-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// SUPPORT-2002: Vertex has NaN or Infinity coordinate
    InvalidCoordinate = 2002,

    /// SUPPORT-3001: Failed to write a debug file
    IoWrite = 3001,
}

impl SupportErrorCode {
    /// Returns the error code as a string in the format `SUPPORT-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportErrorCode::InvalidRange => "SUPPORT-1001",
            SupportErrorCode::InvalidParameter => "SUPPORT-1002",
            SupportErrorCode::EmptyDirections => "SUPPORT-1003",
            SupportErrorCode::InvalidVertexIndex => "SUPPORT-2001",
            SupportErrorCode::InvalidCoordinate => "SUPPORT-2002",
            SupportErrorCode::IoWrite => "SUPPORT-3001",
        }
    }
}

impl std::fmt::Display for SupportErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while configuring or running support sampling.
#[derive(Debug, Error, Diagnostic)]
pub enum SupportError {
    /// A `[min, max]` range is empty or inverted.
    #[error("invalid {name} range: max {max} must be greater than min {min}")]
    #[diagnostic(
        code(support::config::range),
        help("The width-to-radius mapping divides by (max - min). Make sure max > min for both the width and radius ranges.")
    )]
    InvalidRange {
        name: &'static str,
        min: f64,
        max: f64,
    },

    /// A scalar parameter is outside its valid domain.
    #[error("invalid parameter {name} = {value}: {details}")]
    #[diagnostic(
        code(support::config::parameter),
        help("Check the parameter documentation for its valid range.")
    )]
    InvalidParameter {
        name: &'static str,
        value: f64,
        details: String,
    },

    /// The ray configuration has no directions.
    #[error("ray configuration has no directions")]
    #[diagnostic(
        code(support::config::directions),
        help("Generate directions with create_fibonacci_sphere_samples(angle, count) before casting rays.")
    )]
    EmptyDirections,

    /// Invalid vertex index in face data.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(support::mesh::vertex_index),
        help("Remove faces with invalid vertex references before sampling supports.")
    )]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Invalid coordinate value (NaN or Infinity).
    #[error("invalid coordinate at vertex {vertex_index}: {value}")]
    #[diagnostic(
        code(support::mesh::coordinate),
        help("Check the source data for numerical issues.")
    )]
    InvalidCoordinate { vertex_index: usize, value: f64 },

    /// Error writing a debug file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(support::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SupportError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> SupportErrorCode {
        match self {
            SupportError::InvalidRange { .. } => SupportErrorCode::InvalidRange,
            SupportError::InvalidParameter { .. } => SupportErrorCode::InvalidParameter,
            SupportError::EmptyDirections => SupportErrorCode::EmptyDirections,
            SupportError::InvalidVertexIndex { .. } => SupportErrorCode::InvalidVertexIndex,
            SupportError::InvalidCoordinate { .. } => SupportErrorCode::InvalidCoordinate,
            SupportError::IoWrite { .. } => SupportErrorCode::IoWrite,
        }
    }

    /// Whether the error was caused by configuration rather than input data.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SupportError::InvalidRange { .. }
                | SupportError::InvalidParameter { .. }
                | SupportError::EmptyDirections
        )
    }

    // Constructor helpers

    /// Create an invalid range error.
    pub fn invalid_range(name: &'static str, min: f64, max: f64) -> Self {
        SupportError::InvalidRange { name, min, max }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(name: &'static str, value: f64, details: impl Into<String>) -> Self {
        SupportError::InvalidParameter {
            name,
            value,
            details: details.into(),
        }
    }

    /// Create an invalid vertex index error.
    pub fn invalid_vertex_index(face_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        SupportError::InvalidVertexIndex {
            face_index,
            vertex_index,
            vertex_count,
        }
    }

    /// Create an invalid coordinate error.
    pub fn invalid_coordinate(vertex_index: usize, value: f64) -> Self {
        SupportError::InvalidCoordinate {
            vertex_index,
            value,
        }
    }

    /// Create an I/O write error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SupportError::IoWrite {
            path: path.into(),
            source,
        }
    }
}

/// Check that `value` is finite and not below `min`.
pub(crate) fn ensure_at_least(name: &'static str, value: f64, min: f64) -> SupportResult<()> {
    if !value.is_finite() || value < min {
        return Err(SupportError::invalid_parameter(
            name,
            value,
            format!("must be a finite value >= {min}"),
        ));
    }
    Ok(())
}

/// Check that `value` is finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> SupportResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SupportError::invalid_parameter(
            name,
            value,
            "must be a finite value > 0",
        ));
    }
    Ok(())
}

/// Check that a `[min, max]` range is finite and non-empty.
pub(crate) fn ensure_range(name: &'static str, min: f64, max: f64) -> SupportResult<()> {
    if !min.is_finite() || !max.is_finite() || max <= min {
        return Err(SupportError::invalid_range(name, min, max));
    }
    Ok(())
}
