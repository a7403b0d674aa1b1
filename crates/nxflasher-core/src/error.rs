//! Error types for nxflasher-core
//!
//! A single `Copy` error type covers every way a call can fail: the
//! parameter envelope, the device descriptor, address ranges, routing and
//! whatever the back end reports. Back-end errors pass through unchanged.

use core::fmt;

/// Why a device description was rejected
///
/// The validator reports only the first failing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    /// No device description was supplied
    Missing,
    /// The valid flag is not set (no successful detect)
    NotValid,
    /// The record was produced by a build with a different layout
    SizeMismatch {
        /// Size of the record in this build
        expected: u32,
        /// Size recorded in the descriptor
        found: u32,
    },
    /// The record carries a foreign interface version
    VersionMismatch {
        /// Interface version of this build
        expected: u32,
        /// Version recorded in the descriptor
        found: u32,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Envelope errors
    /// Board or platform initialization failed
    PlatformInit,
    /// Parameter block has an unsupported version
    UnknownParamVersion(u32),
    /// Operation code is outside the supported set
    UnknownOperationMode(u32),

    // Validation errors
    /// Device description failed validation
    Descriptor(DescriptorError),
    /// Start address is not below the end address
    InvalidRange {
        /// First address of the range
        start: u32,
        /// Address one past the range
        end: u32,
    },
    /// Bus tag is unknown or has no back end in this build
    IllegalDevice(u32),
    /// Details of a single unit were requested
    UnitInfoUnsupported {
        /// Requested bus
        bus: u32,
        /// Requested unit
        unit: u32,
    },

    // Back-end errors
    /// No flash device responded at the requested location
    DeviceNotFound,
    /// Address is beyond the device size
    AddressOutOfBounds,
    /// Operation requires erase-block aligned bounds
    InvalidAlignment,
    /// Provided buffer is too small for the operation
    BufferTooSmall,
    /// Read operation failed
    ReadError,
    /// Write/program operation failed
    WriteError,
    /// Erase operation failed
    EraseError,
    /// Verify operation failed
    VerifyError,
    /// Device did not become ready in time
    Timeout,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing device description"),
            Self::NotValid => write!(f, "the device description is not valid"),
            Self::SizeMismatch { expected, found } => write!(
                f,
                "the size of the device description ({} bytes) differs from the internal representation ({} bytes)",
                found, expected
            ),
            Self::VersionMismatch { expected, found } => write!(
                f,
                "the device description has an invalid version: {:04x}.{:04x}, expected {:04x}.{:04x}",
                found >> 16,
                found & 0xffff,
                expected >> 16,
                expected & 0xffff
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlatformInit => write!(f, "failed to initialize the board"),
            Self::UnknownParamVersion(v) => write!(
                f,
                "unknown parameter version: {:04x}.{:04x}, expected 0002.0000",
                v >> 16,
                v & 0xffff
            ),
            Self::UnknownOperationMode(mode) => write!(f, "unknown operation mode: {}", mode),
            Self::Descriptor(e) => write!(f, "{}", e),
            Self::InvalidRange { start, end } => write!(
                f,
                "first address 0x{:08X} is greater or equal than last address 0x{:08X}",
                start, end
            ),
            Self::IllegalDevice(bus) => write!(f, "illegal device id specified: {}", bus),
            Self::UnitInfoUnsupported { bus, unit } => {
                write!(f, "no unit info available for bus {} unit {}", bus, unit)
            }
            Self::DeviceNotFound => write!(f, "flash device not found"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::ReadError => write!(f, "read operation failed"),
            Self::WriteError => write!(f, "write operation failed"),
            Self::EraseError => write!(f, "erase operation failed"),
            Self::VerifyError => write!(f, "verify operation failed"),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl From<DescriptorError> for Error {
    fn from(e: DescriptorError) -> Self {
        Self::Descriptor(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DescriptorError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
