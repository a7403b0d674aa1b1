//! Back-end capability set and bus routing
//!
//! Every memory technology implements [`FlashBackend`]. The dispatcher never
//! switches on bus tags itself; it asks the [`BusRouter`] for the back end
//! registered under the tag and reports "illegal device" for anything else.
//! A build without, say, SPI support simply never registers an SPI back end.

#[cfg(feature = "checksum")]
use crate::checksum::Accumulator;
use crate::device::BusType;
use crate::error::{Error, Result};
#[cfg(feature = "checksum")]
use crate::params::ChecksumParams;
use crate::params::{
    DetectParams, EraseAreaParams, EraseParams, FlashParams, IsErasedParams, ReadParams,
    VerifyParams,
};

/// Capabilities a flash back end provides
///
/// Calls are blocking and may take as long as the hardware needs; timeouts
/// are the back end's business. Errors are passed to the host unchanged.
pub trait FlashBackend {
    /// Identify the device on the bus and fill `params.device`
    ///
    /// The description arrives zeroed. On success it must be a record that
    /// passes [`validate`](crate::device::validate).
    fn detect(&mut self, params: &mut DetectParams<'_>) -> Result<()>;

    /// Program `params.data` at `params.start`
    fn flash(&mut self, params: &FlashParams<'_>) -> Result<()>;

    /// Erase `params.start..params.end`
    fn erase(&mut self, params: &EraseParams<'_>) -> Result<()>;

    /// Fill `params.buffer` from `params.start`
    fn read(&mut self, params: &mut ReadParams<'_>) -> Result<()>;

    /// Compare the device against `params.data`
    ///
    /// The comparison outcome goes to `return_message`.
    fn verify(
        &mut self,
        params: &VerifyParams<'_>,
        return_message: &mut Option<usize>,
    ) -> Result<()>;

    /// Stream `params.start..params.end` into `hasher`
    #[cfg(feature = "checksum")]
    fn checksum(&mut self, params: &ChecksumParams<'_>, hasher: &mut Accumulator) -> Result<()>;

    /// Check whether `params.start..params.end` is erased
    ///
    /// The outcome goes to `return_message`.
    fn is_erased(
        &mut self,
        params: &IsErasedParams<'_>,
        return_message: &mut Option<usize>,
    ) -> Result<()>;

    /// Widen `params.start..params.end` to erase-block boundaries in place
    fn get_erase_area(&mut self, params: &mut EraseAreaParams<'_>) -> Result<()>;
}

/// Lookup from bus tag to back end
///
/// Holds at most one back end per [`BusType`]. The router borrows its back
/// ends, so it works without an allocator.
pub struct BusRouter<'a> {
    slots: [Option<&'a mut dyn FlashBackend>; BusType::COUNT],
}

impl Default for BusRouter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BusRouter<'a> {
    /// A router with no back ends
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Register `backend` for `bus`, returning the one it replaces
    pub fn register(
        &mut self,
        bus: BusType,
        backend: &'a mut dyn FlashBackend,
    ) -> Option<&'a mut dyn FlashBackend> {
        self.slots[bus as usize].replace(backend)
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, bus: BusType, backend: &'a mut dyn FlashBackend) -> Self {
        self.register(bus, backend);
        self
    }

    /// Whether a back end is registered for `bus`
    pub fn is_registered(&self, bus: BusType) -> bool {
        self.slots[bus as usize].is_some()
    }

    /// Buses with a registered back end, in tag order
    pub fn buses(&self) -> impl Iterator<Item = BusType> {
        let registered = BusType::ALL.map(|bus| self.is_registered(bus));
        BusType::ALL
            .into_iter()
            .zip(registered)
            .filter_map(|(bus, registered)| registered.then_some(bus))
    }

    /// Find the back end for a raw bus tag
    ///
    /// Unknown tags and buses without a back end both fail with
    /// [`Error::IllegalDevice`].
    pub fn resolve(&mut self, tag: u32) -> Result<&mut (dyn FlashBackend + 'a)> {
        let backend = BusType::from_raw(tag)
            .and_then(|bus| self.slots[bus as usize].as_deref_mut().map(|b| (bus, b)));

        match backend {
            Some((bus, backend)) => {
                log::info!("Device: {}", bus);
                Ok(backend)
            }
            None => {
                log::info!("Device: unknown");
                log::error!("Illegal device id specified: {}", tag);
                Err(Error::IllegalDevice(tag))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[test]
    fn test_empty_router_rejects_everything() {
        let mut router = BusRouter::new();
        for tag in [0, 1, 2, u32::MAX] {
            assert_eq!(router.resolve(tag).err(), Some(Error::IllegalDevice(tag)));
        }
    }

    #[test]
    fn test_unregistered_bus_is_illegal() {
        let mut par = MockBackend::new(BusType::ParallelFlash);
        let mut router = BusRouter::new().with(BusType::ParallelFlash, &mut par);

        assert!(router.resolve(BusType::ParallelFlash.raw()).is_ok());
        assert_eq!(
            router.resolve(BusType::Spi.raw()).err(),
            Some(Error::IllegalDevice(1))
        );
        assert_eq!(router.resolve(7).err(), Some(Error::IllegalDevice(7)));
    }

    #[test]
    fn test_register_replaces() {
        let mut first = MockBackend::new(BusType::Spi);
        let mut second = MockBackend::new(BusType::Spi);
        let mut router = BusRouter::new();

        assert!(router.register(BusType::Spi, &mut first).is_none());
        assert!(router.register(BusType::Spi, &mut second).is_some());
        assert!(router.is_registered(BusType::Spi));
        assert!(!router.is_registered(BusType::ParallelFlash));
    }

    #[test]
    fn test_buses_lists_registered_only() {
        let mut spi = MockBackend::new(BusType::Spi);
        let router = BusRouter::new().with(BusType::Spi, &mut spi);
        let mut buses = router.buses();
        assert_eq!(buses.next(), Some(BusType::Spi));
        assert_eq!(buses.next(), None);
    }
}
