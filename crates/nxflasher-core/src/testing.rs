//! Call-counting back end used by the unit tests

use crate::backend::FlashBackend;
#[cfg(feature = "checksum")]
use crate::checksum::{Accumulator, Digest};
use crate::device::{BusType, DeviceDescription};
use crate::error::{Error, Result};
#[cfg(feature = "checksum")]
use crate::params::ChecksumParams;
use crate::params::{
    DetectParams, EraseAreaParams, EraseParams, FlashParams, IsErasedParams, ReadParams,
    VerifyParams,
};

/// Number of calls seen per capability
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub detect: u32,
    pub flash: u32,
    pub erase: u32,
    pub read: u32,
    pub verify: u32,
    pub checksum: u32,
    pub is_erased: u32,
    pub get_erase_area: u32,
}

impl Calls {
    pub fn total(&self) -> u32 {
        self.detect
            + self.flash
            + self.erase
            + self.read
            + self.verify
            + self.checksum
            + self.is_erased
            + self.get_erase_area
    }
}

pub struct MockBackend {
    pub bus: BusType,
    pub calls: Calls,
    /// Error returned by every capability when set
    pub fail: Option<Error>,
    /// Byte pattern returned by read and hashed by checksum
    pub fill: u8,
}

impl MockBackend {
    pub fn new(bus: BusType) -> Self {
        Self {
            bus,
            calls: Calls::default(),
            fail: None,
            fill: 0xA5,
        }
    }

    pub fn failing(bus: BusType, error: Error) -> Self {
        Self {
            fail: Some(error),
            ..Self::new(bus)
        }
    }

    fn outcome(&self) -> Result<()> {
        match self.fail {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl FlashBackend for MockBackend {
    fn detect(&mut self, params: &mut DetectParams<'_>) -> Result<()> {
        self.calls.detect += 1;
        self.outcome()?;
        let mut dev = DeviceDescription::detected(self.bus, params.unit, params.chip_select);
        dev.device_size = 0x1_0000;
        dev.sector_size = 0x1000;
        dev.page_size = 256;
        *params.device = dev;
        Ok(())
    }

    fn flash(&mut self, _params: &FlashParams<'_>) -> Result<()> {
        self.calls.flash += 1;
        self.outcome()
    }

    fn erase(&mut self, _params: &EraseParams<'_>) -> Result<()> {
        self.calls.erase += 1;
        self.outcome()
    }

    fn read(&mut self, params: &mut ReadParams<'_>) -> Result<()> {
        self.calls.read += 1;
        self.outcome()?;
        params.buffer.fill(self.fill);
        Ok(())
    }

    fn verify(
        &mut self,
        _params: &VerifyParams<'_>,
        return_message: &mut Option<usize>,
    ) -> Result<()> {
        self.calls.verify += 1;
        self.outcome()?;
        *return_message = Some(0);
        Ok(())
    }

    #[cfg(feature = "checksum")]
    fn checksum(&mut self, params: &ChecksumParams<'_>, hasher: &mut Accumulator) -> Result<()> {
        self.calls.checksum += 1;
        // Fail after the first byte has been fed, like a read error mid-stream
        hasher.update([self.fill]);
        self.outcome()?;
        for _ in params.start + 1..params.end {
            hasher.update([self.fill]);
        }
        Ok(())
    }

    fn is_erased(
        &mut self,
        _params: &IsErasedParams<'_>,
        return_message: &mut Option<usize>,
    ) -> Result<()> {
        self.calls.is_erased += 1;
        self.outcome()?;
        *return_message = Some(0xFF);
        Ok(())
    }

    fn get_erase_area(&mut self, params: &mut EraseAreaParams<'_>) -> Result<()> {
        self.calls.get_erase_area += 1;
        self.outcome()?;
        params.start &= !0xFFF;
        params.end = (params.end + 0xFFF) & !0xFFF;
        Ok(())
    }
}
