#![forbid(unsafe_code)]
//! Error types for rucfs.
//!
//! # Error Taxonomy
//!
//! rucfs uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `rucfs-types` | Format violations detected while decoding image bytes |
//! | Runtime | `RucfsError` | `rucfs-error` (this crate) | Errors returned by `load`, resolution, enumeration and open |
//!
//! ## Mapping Policy: ParseError → RucfsError
//!
//! `rucfs-error` does not depend on `rucfs-types`; the conversion lives in
//! `rucfs-core`, which depends on both.
//!
//! | ParseError Variant | RucfsError Variant |
//! |--------------------|--------------------|
//! | `InvalidMagic` | `Corruption` |
//! | `UnsupportedVersion` | `Unsupported` |
//! | `InsufficientData` | `Corruption` |
//! | `InvalidField` | `Corruption` |
//! | `IntegerConversion` | `Corruption` |
//!
//! A failed `load` is permanent for that image. Resolution and enumeration
//! never return partial results.
//!
//! ## errno Mapping
//!
//! | Variant | errno |
//! |---------|-------|
//! | `InvalidArgument` | `EINVAL` |
//! | `Corruption` | `EIO` |
//! | `Unsupported` | `EOPNOTSUPP` |
//! | `NotFound` | `ENOENT` |
//! | `OutOfMemory` | `ENOMEM` |

use thiserror::Error;

/// Unified error type for all rucfs operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RucfsError {
    /// The caller passed an unusable argument (empty path, undersized capacity).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Image bytes violate the format: bad magic, broken root invariants,
    /// or an offset that leaves the image.
    ///
    /// `offset` is the absolute image offset being decoded when the problem
    /// was detected.
    #[error("corrupt image at offset {offset:#x}: {detail}")]
    Corruption { offset: u64, detail: String },

    /// The image uses a format version this build cannot read.
    #[error("unsupported image: {0}")]
    Unsupported(String),

    /// The path does not name an entry, or names one of the wrong kind for
    /// the requested operation.
    #[error("not found: {0}")]
    NotFound(String),

    /// Allocation of a caller-visible result failed.
    #[error("out of memory")]
    OutOfMemory,
}

impl RucfsError {
    /// Convert this error into a POSIX errno.
    ///
    /// The mapping is exhaustive; a new variant does not compile until it
    /// has an errno.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::Corruption { .. } => libc::EIO,
            Self::Unsupported(_) => libc::EOPNOTSUPP,
            Self::NotFound(_) => libc::ENOENT,
            Self::OutOfMemory => libc::ENOMEM,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

/// Result alias using `RucfsError`.
pub type Result<T> = std::result::Result<T, RucfsError>;
