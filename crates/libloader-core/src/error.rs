//! Error taxonomy shared by the loader and its C ABI boundary.
//!
//! The Rust API returns these through `Result`; the C ABI collapses every
//! variant to a null (or `false`) return.

use thiserror::Error;

/// Failure modes of loader and allocator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum LoaderError {
    /// Null or empty path or symbol name, or a path the platform cannot
    /// express (interior NUL, non-UTF-8 where the loader needs narrow text).
    #[error("invalid argument")]
    InvalidArgument,
    /// The named shared object does not exist or could not be located.
    #[error("shared object not found")]
    NotFound,
    /// The file exists but is not a loadable image for this process.
    #[error("file is not a loadable shared object")]
    InvalidImage,
    /// The library is loaded but does not export the requested symbol.
    #[error("undefined symbol")]
    SymbolNotFound,
    /// The active allocator returned null during an internal allocation.
    #[error("memory allocation failed")]
    AllocationFailure,
    /// The query is answerable but not authoritative on this platform.
    #[error("operation is not authoritative on this platform")]
    PlatformUnsupportedOperation,
    /// An allocator override is already installed.
    #[error("an allocator override is already installed")]
    AllocatorBusy,
}

impl LoaderError {
    pub const ALL: [Self; 7] = [
        Self::InvalidArgument,
        Self::NotFound,
        Self::InvalidImage,
        Self::SymbolNotFound,
        Self::AllocationFailure,
        Self::PlatformUnsupportedOperation,
        Self::AllocatorBusy,
    ];

    /// The same text as `Display`, without allocating.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "shared object not found",
            Self::InvalidImage => "file is not a loadable shared object",
            Self::SymbolNotFound => "undefined symbol",
            Self::AllocationFailure => "memory allocation failed",
            Self::PlatformUnsupportedOperation => {
                "operation is not authoritative on this platform"
            }
            Self::AllocatorBusy => "an allocator override is already installed",
        }
    }

    /// Stable short identifier, suitable for structured log fields.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::InvalidImage => "invalid_image",
            Self::SymbolNotFound => "symbol_not_found",
            Self::AllocationFailure => "allocation_failure",
            Self::PlatformUnsupportedOperation => "platform_unsupported_operation",
            Self::AllocatorBusy => "allocator_busy",
        }
    }

    /// Inverse of [`LoaderError::code`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }
}
