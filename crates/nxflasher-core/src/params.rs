//! Input parameter block
//!
//! The host passes one [`InputParameters`] per call. Each operation has its
//! own payload type, so a field can never be read under the wrong
//! interpretation. Output fields (read buffer, digest, adjusted erase area)
//! live in the payload; counts and flags go to
//! [`ConsoleParams::return_message`].

use core::fmt;

#[cfg(feature = "checksum")]
use crate::checksum::DIGEST_LEN;
use crate::device::DeviceDescription;
use crate::PARAM_VERSION;

/// Operation codes of the parameter block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OperationMode {
    /// Program data into the device
    Flash = 0,
    /// Erase an address range
    Erase = 1,
    /// Read an address range
    Read = 2,
    /// Compare the device against data
    Verify = 3,
    /// SHA-1 over an address range
    Checksum = 4,
    /// Identify the device on a bus
    Detect = 5,
    /// Check whether a range is erased
    IsErased = 6,
    /// Widen a range to erase-block boundaries
    GetEraseArea = 7,
    /// Enumerate buses and units
    GetBoardInfo = 8,
}

impl OperationMode {
    /// Convert a raw operation code, `None` for codes outside the set
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Flash),
            1 => Some(Self::Erase),
            2 => Some(Self::Read),
            3 => Some(Self::Verify),
            4 => Some(Self::Checksum),
            5 => Some(Self::Detect),
            6 => Some(Self::IsErased),
            7 => Some(Self::GetEraseArea),
            8 => Some(Self::GetBoardInfo),
            _ => None,
        }
    }

    /// Raw operation code
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Whether this build has an [`Operation`] payload for the mode
    ///
    /// Checksum needs the `checksum` feature; every other mode is always
    /// built in.
    pub fn is_supported(self) -> bool {
        self != Self::Checksum || cfg!(feature = "checksum")
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flash => "Flash",
            Self::Erase => "Erase",
            Self::Read => "Read",
            Self::Verify => "Verify",
            Self::Checksum => "Checksum (SHA1)",
            Self::Detect => "Detect",
            Self::IsErased => "IsErased",
            Self::GetEraseArea => "Get Erase Area",
            Self::GetBoardInfo => "Get Board Info",
        };
        f.write_str(name)
    }
}

/// Detect a device and fill in its description
#[derive(Debug)]
pub struct DetectParams<'a> {
    /// Raw bus tag to search
    pub bus: u32,
    /// Controller unit on the bus
    pub unit: u32,
    /// Chip select line on the unit
    pub chip_select: u32,
    /// Output description, cleared before the back end runs
    pub device: &'a mut DeviceDescription,
}

/// Program `data` starting at `start`
#[derive(Debug)]
pub struct FlashParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First device address to program
    pub start: u32,
    /// Data to program
    pub data: &'a [u8],
}

/// Erase `start..end`
#[derive(Debug)]
pub struct EraseParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First address to erase
    pub start: u32,
    /// Address one past the range
    pub end: u32,
}

/// Read `buffer.len()` bytes starting at `start`
#[derive(Debug)]
pub struct ReadParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First address to read
    pub start: u32,
    /// Destination buffer
    pub buffer: &'a mut [u8],
}

/// Compare the device against `data` starting at `start`
#[derive(Debug)]
pub struct VerifyParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First address to compare
    pub start: u32,
    /// Expected content
    pub data: &'a [u8],
}

/// SHA-1 over `start..end`
#[cfg(feature = "checksum")]
#[derive(Debug)]
pub struct ChecksumParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First address to hash
    pub start: u32,
    /// Address one past the range
    pub end: u32,
    /// Output digest, written only when the operation succeeds
    pub digest: [u8; DIGEST_LEN],
}

/// Check whether `start..end` is erased
#[derive(Debug)]
pub struct IsErasedParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First address to check
    pub start: u32,
    /// Address one past the range
    pub end: u32,
}

/// Widen `start..end` to the enclosing erase blocks
///
/// The back end rewrites `start` and `end` in place.
#[derive(Debug)]
pub struct EraseAreaParams<'a> {
    /// Device from a previous detect
    pub device: Option<&'a DeviceDescription>,
    /// First address, rounded down on success
    pub start: u32,
    /// Address one past the range, rounded up on success
    pub end: u32,
}

/// Enumerate buses or units into `buffer`
#[derive(Debug)]
pub struct BoardInfoParams<'a> {
    /// Bus to enumerate, [`ALL`](crate::ALL) for the bus table
    pub bus_id: u32,
    /// Unit to describe, [`ALL`](crate::ALL) for the unit table
    pub unit_id: u32,
    /// Output buffer; its length is the capacity
    pub buffer: &'a mut [u8],
}

/// Operation payload, one variant per operation code
#[derive(Debug)]
pub enum Operation<'a> {
    /// See [`FlashParams`]
    Flash(FlashParams<'a>),
    /// See [`EraseParams`]
    Erase(EraseParams<'a>),
    /// See [`ReadParams`]
    Read(ReadParams<'a>),
    /// See [`VerifyParams`]
    Verify(VerifyParams<'a>),
    /// See [`ChecksumParams`]
    #[cfg(feature = "checksum")]
    Checksum(ChecksumParams<'a>),
    /// See [`DetectParams`]
    Detect(DetectParams<'a>),
    /// See [`IsErasedParams`]
    IsErased(IsErasedParams<'a>),
    /// See [`EraseAreaParams`]
    GetEraseArea(EraseAreaParams<'a>),
    /// See [`BoardInfoParams`]
    GetBoardInfo(BoardInfoParams<'a>),
    /// A code this build does not handle; always rejected
    Unknown(u32),
}

impl Operation<'_> {
    /// Raw operation code of this payload
    pub fn code(&self) -> u32 {
        match self {
            Self::Flash(_) => OperationMode::Flash.raw(),
            Self::Erase(_) => OperationMode::Erase.raw(),
            Self::Read(_) => OperationMode::Read.raw(),
            Self::Verify(_) => OperationMode::Verify.raw(),
            #[cfg(feature = "checksum")]
            Self::Checksum(_) => OperationMode::Checksum.raw(),
            Self::Detect(_) => OperationMode::Detect.raw(),
            Self::IsErased(_) => OperationMode::IsErased.raw(),
            Self::GetEraseArea(_) => OperationMode::GetEraseArea.raw(),
            Self::GetBoardInfo(_) => OperationMode::GetBoardInfo.raw(),
            Self::Unknown(code) => *code,
        }
    }
}

/// Versioned parameter block passed by the host
#[derive(Debug)]
pub struct InputParameters<'a> {
    /// Parameter block version, must be [`PARAM_VERSION`]
    pub param_version: u32,
    /// Operation and its parameters
    pub operation: Operation<'a>,
}

impl<'a> InputParameters<'a> {
    /// Parameter block of the current version
    pub fn new(operation: Operation<'a>) -> Self {
        Self {
            param_version: PARAM_VERSION,
            operation,
        }
    }
}

/// Console parameter block: the entry point's only argument
///
/// Besides the host's parameters it carries the out-of-band return message
/// written by verify, is-erased and board-info. `None` means no value.
#[derive(Debug)]
pub struct ConsoleParams<'p, 'a> {
    /// The host's parameter block
    pub params: &'p mut InputParameters<'a>,
    /// Out-of-band return value
    pub return_message: Option<usize>,
}

impl<'p, 'a> ConsoleParams<'p, 'a> {
    /// Wrap a parameter block, with no return message yet
    pub fn new(params: &'p mut InputParameters<'a>) -> Self {
        Self {
            params,
            return_message: None,
        }
    }
}
