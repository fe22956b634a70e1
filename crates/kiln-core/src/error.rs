//! # Kiln Error Handling
//!
//! Error types for the encoder stack.
//!
//! Contract violations (zero-sized operations, aliasing ranges, missing
//! hardware capability) are programming errors and fail fast with a panic.
//! Everything a caller can react to at runtime is an [`Error`].

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Kiln Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Kiln unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation not supported on this hardware or ring
    NotSupported,
    /// The requested ring does not exist on this context
    RingUnavailable,

    // =========================================================================
    // Memory Errors
    // =========================================================================
    /// No room left in the GPU virtual address space
    OutOfAddressSpace,

    // =========================================================================
    // Command Submission Errors
    // =========================================================================
    /// Not enough free dwords in the current command buffer.
    ///
    /// Submit the buffer and retry; an empty buffer will have room.
    CommandBufferFull,
    /// The operation needs more dwords than an empty command buffer holds
    ExceedsRingCapacity,
    /// Malformed or unknown packet in a command stream
    InvalidCommand,
    /// A packet references memory that no preceding relocation declares
    MissingRelocation,
}

impl Error {
    /// Whether submitting the current command buffer and retrying can succeed
    #[inline]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::CommandBufferFull)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::RingUnavailable => write!(f, "ring not available"),

            // Memory
            Self::OutOfAddressSpace => write!(f, "out of GPU address space"),

            // Command
            Self::CommandBufferFull => write!(f, "command buffer full"),
            Self::ExceedsRingCapacity => write!(f, "operation exceeds command buffer capacity"),
            Self::InvalidCommand => write!(f, "invalid command"),
            Self::MissingRelocation => write!(f, "packet references an undeclared buffer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_buffer_full_is_retryable() {
        assert!(Error::CommandBufferFull.is_retryable());
        assert!(!Error::ExceedsRingCapacity.is_retryable());
        assert!(!Error::NotSupported.is_retryable());
        assert!(!Error::MissingRelocation.is_retryable());
    }
}
