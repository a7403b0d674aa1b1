//! Device descriptions and their validation
//!
//! A [`DeviceDescription`] is produced by a successful detect and then
//! carried opaquely by the host into every later call. Host and flasher
//! are built independently, so the record stamps its own size and the
//! interface version; [`validate`] compares both against this build
//! before the record is trusted.

use core::fmt;
use core::mem::size_of;

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::error::{DescriptorError, Error, Result};
use crate::FLASHER_INTERFACE_VERSION;

/// Bus a flash device is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BusType {
    /// Parallel NOR flash on the memory bus
    ParallelFlash = 0,
    /// Serial flash on an SPI controller
    Spi = 1,
}

impl BusType {
    /// Number of bus types
    pub const COUNT: usize = 2;

    /// All bus types, in tag order
    pub const ALL: [BusType; Self::COUNT] = [BusType::ParallelFlash, BusType::Spi];

    /// Convert a raw bus tag, `None` for unknown tags
    pub fn from_raw(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::ParallelFlash),
            1 => Some(Self::Spi),
            _ => None,
        }
    }

    /// Raw bus tag as stored in parameter blocks and descriptors
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Human readable bus name
    pub const fn name(self) -> &'static str {
        match self {
            Self::ParallelFlash => "Parallel flash",
            Self::Spi => "SPI flash",
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size in bytes of a [`DeviceDescription`] in this build
pub const DESCRIPTION_SIZE: u32 = size_of::<DeviceDescription>() as u32;

/// Length of the identification field
pub const DEVICE_ID_LEN: usize = 16;

/// Description of a detected flash device
///
/// The layout is fixed: `#[repr(C)]`, little-endian `u32` fields, no
/// padding. The host stores the raw bytes between calls, see
/// [`DeviceDescription::from_bytes`] and [`DeviceDescription::as_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DeviceDescription {
    /// Non-zero once a detect operation succeeded
    pub is_valid: u32,
    /// Size of this record in the producing build
    pub size_this: u32,
    /// Interface version of the producing build
    pub version: u32,
    /// Raw [`BusType`] tag
    pub bus: u32,
    /// Controller unit on the bus
    pub unit: u32,
    /// Chip select line on the unit
    pub chip_select: u32,
    /// Total device size in bytes
    pub device_size: u32,
    /// Smallest erase block in bytes
    pub sector_size: u32,
    /// Program page size in bytes
    pub page_size: u32,
    /// Identification bytes (JEDEC or CFI id), zero padded
    pub id: [u8; DEVICE_ID_LEN],
}

const _: () = assert!(DESCRIPTION_SIZE == 52);

impl DeviceDescription {
    /// An all-zero (invalid) description
    pub fn zeroed() -> Self {
        Self::new_zeroed()
    }

    /// A valid description for a device with the given geometry
    ///
    /// Back ends call this from detect once the device has answered.
    pub fn detected(bus: BusType, unit: u32, chip_select: u32) -> Self {
        Self {
            is_valid: 1,
            size_this: DESCRIPTION_SIZE,
            version: FLASHER_INTERFACE_VERSION,
            bus: bus.raw(),
            unit,
            chip_select,
            ..Self::zeroed()
        }
    }

    /// Reset the record to all zeroes
    pub fn clear(&mut self) {
        *self = Self::new_zeroed();
    }

    /// Whether the valid flag is set
    pub fn is_valid(&self) -> bool {
        self.is_valid != 0
    }

    /// Bus of the device, `None` for an unknown tag
    pub fn bus_type(&self) -> Option<BusType> {
        BusType::from_raw(self.bus)
    }

    /// Parse a description stored by the host
    ///
    /// Only the byte length is checked here; use [`validate`] before
    /// trusting the content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from_bytes(bytes).map_err(|_| {
            Error::Descriptor(DescriptorError::SizeMismatch {
                expected: DESCRIPTION_SIZE,
                found: bytes.len() as u32,
            })
        })
    }

    /// Raw bytes of the record, as stored by the host
    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }
}

/// How handlers treat a descriptor that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorPolicy {
    /// Report the failure and still route by the descriptor's bus tag
    ///
    /// This is the historical behavior: the operation is attempted and the
    /// back end decides whether it can work with the record.
    #[default]
    Permissive,
    /// Report the failure and abort before any back end is called
    Strict,
}

/// Check a device description before it is used
///
/// Checks run in order and the first failure wins: presence, valid flag,
/// record size, interface version. Every outcome is logged, as the log is
/// the only place an operator sees why a descriptor was rejected.
pub fn validate(device: Option<&DeviceDescription>) -> core::result::Result<(), DescriptorError> {
    let result = check(device);
    match &result {
        Ok(()) => log::info!("The device description seems to be ok."),
        Err(e) => log::error!("Device description rejected: {}", e),
    }
    result
}

fn check(device: Option<&DeviceDescription>) -> core::result::Result<(), DescriptorError> {
    let device = device.ok_or(DescriptorError::Missing)?;

    if !device.is_valid() {
        return Err(DescriptorError::NotValid);
    }
    if device.size_this != DESCRIPTION_SIZE {
        return Err(DescriptorError::SizeMismatch {
            expected: DESCRIPTION_SIZE,
            found: device.size_this,
        });
    }
    if device.version != FLASHER_INTERFACE_VERSION {
        return Err(DescriptorError::VersionMismatch {
            expected: FLASHER_INTERFACE_VERSION,
            found: device.version,
        });
    }

    Ok(())
}
