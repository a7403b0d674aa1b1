//! Emulated flash device
//!
//! Behaves like NOR flash: the erased state is 0xFF, programming can only
//! clear bits and erasing works on whole sectors.

use std::ops::Range;

use bitflags::bitflags;
#[cfg(feature = "checksum")]
use nxflasher_core::checksum::{Accumulator, Digest};
use nxflasher_core::device::DEVICE_ID_LEN;
#[cfg(feature = "checksum")]
use nxflasher_core::params::ChecksumParams;
use nxflasher_core::params::{
    DetectParams, EraseAreaParams, EraseParams, FlashParams, IsErasedParams, ReadParams,
    VerifyParams,
};
use nxflasher_core::{BusType, DeviceDescription, Error, FlashBackend, Result};

/// Chunk size used when streaming the device into a checksum
const CHECKSUM_CHUNK: usize = 4096;

/// Return message of verify when the device matches
pub const VERIFY_EQUAL: usize = 0;
/// Return message of verify when the device differs
pub const VERIFY_DIFFERENT: usize = 1;
/// Return message of is-erased when the range is erased
pub const ERASED: usize = 0xFF;
/// Return message of is-erased when the range holds data
pub const NOT_ERASED: usize = 0;

bitflags! {
    /// Capabilities that should fail
    ///
    /// Used to emulate hardware faults in tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Faults: u32 {
        /// Device does not answer detect
        const DETECT     = 1 << 0;
        /// Programming fails
        const FLASH      = 1 << 1;
        /// Erasing fails
        const ERASE      = 1 << 2;
        /// Reading fails
        const READ       = 1 << 3;
        /// Verify cannot read the device
        const VERIFY     = 1 << 4;
        /// Checksum fails after the first chunk
        const CHECKSUM   = 1 << 5;
        /// Erase check cannot read the device
        const IS_ERASED  = 1 << 6;
        /// Erase area lookup fails
        const ERASE_AREA = 1 << 7;
    }
}

/// Configuration for an emulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuConfig {
    /// Bus the device sits on
    pub bus: BusType,
    /// Unit the device answers on
    pub unit: u32,
    /// Chip select the device answers on
    pub chip_select: u32,
    /// Flash size in bytes
    pub size: usize,
    /// Smallest erase block in bytes (power of two)
    pub sector_size: usize,
    /// Program page size in bytes
    pub page_size: usize,
    /// Identification bytes reported by detect
    pub id: Vec<u8>,
}

impl EmuConfig {
    /// 16 MiB SPI NOR flash (W25Q128-like) on unit 0, chip select 0
    pub fn spi() -> Self {
        Self {
            bus: BusType::Spi,
            unit: 0,
            chip_select: 0,
            size: 16 * 1024 * 1024,
            sector_size: 4096,
            page_size: 256,
            id: vec![0xEF, 0x40, 0x18],
        }
    }

    /// 4 MiB 16-bit parallel NOR flash (CFI, uniform 64 KiB sectors)
    pub fn parallel() -> Self {
        Self {
            bus: BusType::ParallelFlash,
            unit: 0,
            chip_select: 0,
            size: 4 * 1024 * 1024,
            sector_size: 64 * 1024,
            page_size: 32,
            id: vec![0x01, 0x00, 0x7E, 0x22],
        }
    }

    /// Same device with a different size
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self::spi()
    }
}

/// Emulated flash back end
pub struct EmulatedFlash {
    config: EmuConfig,
    data: Vec<u8>,
    faults: Faults,
}

impl EmulatedFlash {
    /// Create an erased device with the given configuration
    pub fn new(config: EmuConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            faults: Faults::empty(),
        }
    }

    /// Create a device with pre-filled data
    pub fn with_data(config: EmuConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &EmuConfig {
        &self.config
    }

    /// Make the given capabilities fail from now on
    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    fn fault(&self, fault: Faults, error: Error) -> Result<()> {
        if self.faults.contains(fault) {
            log::error!("Emulated {:?} fault", fault);
            return Err(error);
        }
        Ok(())
    }

    fn span(&self, start: u32, len: usize) -> Result<Range<usize>> {
        let start = start as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => {
                log::error!(
                    "Range 0x{:08X}+0x{:X} exceeds device size 0x{:X}",
                    start,
                    len,
                    self.data.len()
                );
                Err(Error::AddressOutOfBounds)
            }
        }
    }

    fn bounds(&self, start: u32, end: u32) -> Result<Range<usize>> {
        let Some(len) = end.checked_sub(start) else {
            log::error!(
                "Range 0x{:08X} - 0x{:08X} ends before it starts",
                start,
                end
            );
            return Err(Error::AddressOutOfBounds);
        };
        self.span(start, len as usize)
    }

    fn sector_mask(&self) -> u32 {
        self.config.sector_size as u32 - 1
    }
}

impl FlashBackend for EmulatedFlash {
    fn detect(&mut self, params: &mut DetectParams<'_>) -> Result<()> {
        self.fault(Faults::DETECT, Error::DeviceNotFound)?;

        if params.unit != self.config.unit || params.chip_select != self.config.chip_select {
            log::error!(
                "No flash at unit {} chip select {}",
                params.unit,
                params.chip_select
            );
            return Err(Error::DeviceNotFound);
        }

        let mut device =
            DeviceDescription::detected(self.config.bus, params.unit, params.chip_select);
        device.device_size = self.config.size as u32;
        device.sector_size = self.config.sector_size as u32;
        device.page_size = self.config.page_size as u32;
        let len = core::cmp::min(self.config.id.len(), DEVICE_ID_LEN);
        device.id[..len].copy_from_slice(&self.config.id[..len]);

        log::info!(
            "Found {} with id {:02X?}, {} bytes",
            self.config.bus,
            &self.config.id,
            self.config.size
        );
        *params.device = device;
        Ok(())
    }

    fn flash(&mut self, params: &FlashParams<'_>) -> Result<()> {
        self.fault(Faults::FLASH, Error::WriteError)?;
        let range = self.span(params.start, params.data.len())?;

        // Flash programming: can only change 1 -> 0
        for (cell, &byte) in self.data[range].iter_mut().zip(params.data) {
            *cell &= byte;
        }

        log::debug!(
            "Programmed {} bytes at 0x{:08X}",
            params.data.len(),
            params.start
        );
        Ok(())
    }

    fn erase(&mut self, params: &EraseParams<'_>) -> Result<()> {
        self.fault(Faults::ERASE, Error::EraseError)?;
        let range = self.bounds(params.start, params.end)?;

        let mask = self.sector_mask();
        if params.start & mask != 0 || params.end & mask != 0 {
            log::error!(
                "Erase range 0x{:08X} - 0x{:08X} is not aligned to 0x{:X} byte sectors",
                params.start,
                params.end,
                self.config.sector_size
            );
            return Err(Error::InvalidAlignment);
        }

        // Erase sets all bytes to 0xFF
        self.data[range].fill(0xFF);
        Ok(())
    }

    fn read(&mut self, params: &mut ReadParams<'_>) -> Result<()> {
        self.fault(Faults::READ, Error::ReadError)?;
        let range = self.span(params.start, params.buffer.len())?;
        params.buffer.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn verify(
        &mut self,
        params: &VerifyParams<'_>,
        return_message: &mut Option<usize>,
    ) -> Result<()> {
        self.fault(Faults::VERIFY, Error::ReadError)?;
        let range = self.span(params.start, params.data.len())?;

        let mismatch = self.data[range]
            .iter()
            .zip(params.data)
            .position(|(actual, expected)| actual != expected);

        *return_message = match mismatch {
            None => {
                log::info!("Verify OK, {} bytes equal", params.data.len());
                Some(VERIFY_EQUAL)
            }
            Some(offset) => {
                let addr = params.start as usize + offset;
                log::warn!(
                    "Verify mismatch at 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
                    addr,
                    params.data[offset],
                    self.data[addr]
                );
                Some(VERIFY_DIFFERENT)
            }
        };
        Ok(())
    }

    #[cfg(feature = "checksum")]
    fn checksum(&mut self, params: &ChecksumParams<'_>, hasher: &mut Accumulator) -> Result<()> {
        let range = self.bounds(params.start, params.end)?;

        for (index, chunk) in self.data[range].chunks(CHECKSUM_CHUNK).enumerate() {
            if index > 0 {
                self.fault(Faults::CHECKSUM, Error::ReadError)?;
            }
            hasher.update(chunk);
        }
        Ok(())
    }

    fn is_erased(
        &mut self,
        params: &IsErasedParams<'_>,
        return_message: &mut Option<usize>,
    ) -> Result<()> {
        self.fault(Faults::IS_ERASED, Error::ReadError)?;
        let range = self.bounds(params.start, params.end)?;

        let erased = self.data[range].iter().all(|&b| b == 0xFF);
        log::info!("Area is {}erased", if erased { "" } else { "not " });
        *return_message = Some(if erased { ERASED } else { NOT_ERASED });
        Ok(())
    }

    fn get_erase_area(&mut self, params: &mut EraseAreaParams<'_>) -> Result<()> {
        self.fault(Faults::ERASE_AREA, Error::ReadError)?;
        self.bounds(params.start, params.end)?;

        let mask = self.sector_mask();
        params.start &= !mask;
        // The device size is a multiple of the sector size, so this cannot
        // run past the end
        params.end = (params.end + mask) & !mask;
        Ok(())
    }
}
