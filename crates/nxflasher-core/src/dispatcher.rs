//! Top-level entry point
//!
//! [`Dispatcher::run`] is what the bootloader calls with the host's console
//! parameter block. It brings up the platform, checks the parameter block
//! version, runs exactly one operation handler and turns the outcome into
//! the status LED.

use crate::backend::BusRouter;
use crate::device::DescriptorPolicy;
use crate::error::{Error, Result};
use crate::handlers;
use crate::params::{ConsoleParams, Operation, OperationMode};
use crate::status::{Platform, StatusIndicator, StatusSignal};
use crate::units::Board;
use crate::PARAM_VERSION;

/// Routes parameter blocks to operation handlers
pub struct Dispatcher<'a> {
    router: BusRouter<'a>,
    board: Board<'a>,
    policy: DescriptorPolicy,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher with the permissive descriptor policy
    pub fn new(router: BusRouter<'a>, board: Board<'a>) -> Self {
        Self {
            router,
            board,
            policy: DescriptorPolicy::default(),
        }
    }

    /// Set how invalid device descriptions are handled
    pub fn with_policy(mut self, policy: DescriptorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current descriptor policy
    pub fn policy(&self) -> DescriptorPolicy {
        self.policy
    }

    /// Run one call
    ///
    /// `status` is set to [`StatusSignal::Off`] once the platform is up and
    /// receives exactly one terminal signal: green on success, red on any
    /// failure. A platform that fails to come up only gets red.
    pub fn run<P, S>(
        &mut self,
        platform: &mut P,
        status: &mut S,
        console: &mut ConsoleParams<'_, '_>,
    ) -> Result<()>
    where
        P: Platform + ?Sized,
        S: StatusIndicator + ?Sized,
    {
        if let Err(e) = platform.init() {
            log::error!("Failed to init the board: {}", e);
            status.set(StatusSignal::Red);
            return Err(Error::PlatformInit);
        }

        status.set(StatusSignal::Off);
        log::info!("Flasher v{}", env!("CARGO_PKG_VERSION"));

        let result = self.execute(console);
        match result {
            Ok(()) => {
                log::info!("* OK *");
                status.set(StatusSignal::Green);
            }
            Err(e) => {
                log::error!("Operation failed: {}", e);
                status.set(StatusSignal::Red);
            }
        }

        result
    }

    fn execute(&mut self, console: &mut ConsoleParams<'_, '_>) -> Result<()> {
        let ConsoleParams {
            params,
            return_message,
        } = console;

        let version = params.param_version;
        if version != PARAM_VERSION {
            log::error!(
                "Unknown parameter version: {:04x}.{:04x}. Expected 0002.0000!",
                version >> 16,
                version & 0xffff
            );
            return Err(Error::UnknownParamVersion(version));
        }

        if !matches!(params.operation, Operation::Unknown(_)) {
            if let Some(mode) = OperationMode::from_raw(params.operation.code()) {
                log::info!("Operation Mode: {}", mode);
            }
        }

        let router = &mut self.router;
        let policy = self.policy;

        match &mut params.operation {
            Operation::Detect(p) => handlers::detect(router, p),
            Operation::Flash(p) => handlers::flash(router, policy, p),
            Operation::Erase(p) => handlers::erase(router, policy, p),
            Operation::Read(p) => handlers::read(router, policy, p),
            Operation::Verify(p) => handlers::verify(router, policy, p, return_message),
            #[cfg(feature = "checksum")]
            Operation::Checksum(p) => handlers::checksum(router, policy, p),
            Operation::IsErased(p) => handlers::is_erased(router, policy, p, return_message),
            Operation::GetEraseArea(p) => handlers::get_erase_area(router, policy, p),
            Operation::GetBoardInfo(p) => handlers::get_board_info(&self.board, p, return_message),
            Operation::Unknown(code) => {
                match OperationMode::from_raw(*code).filter(|mode| mode.is_supported()) {
                    Some(mode) => log::error!("Operation mode {} sent without parameters", mode),
                    None => log::error!("Unknown operation mode: {}", code),
                }
                Err(Error::UnknownOperationMode(*code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BusType, DeviceDescription, DESCRIPTION_SIZE};
    use crate::error::DescriptorError;
    use crate::params::*;
    use crate::testing::MockBackend;
    use crate::{ALL, FLASHER_INTERFACE_VERSION};

    /// Records every status write
    #[derive(Default)]
    struct Led {
        writes: [Option<StatusSignal>; 4],
        count: usize,
    }

    impl Led {
        fn history(&self) -> &[Option<StatusSignal>] {
            &self.writes[..self.count]
        }
    }

    impl StatusIndicator for Led {
        fn set(&mut self, signal: StatusSignal) {
            self.writes[self.count] = Some(signal);
            self.count += 1;
        }
    }

    struct Board0 {
        fail: bool,
    }

    impl Platform for Board0 {
        fn init(&mut self) -> Result<()> {
            if self.fail {
                Err(Error::Timeout)
            } else {
                Ok(())
            }
        }
    }

    fn run(
        dispatcher: &mut Dispatcher<'_>,
        params: &mut InputParameters<'_>,
    ) -> (Result<()>, Led, Option<usize>) {
        let mut led = Led::default();
        let mut console = ConsoleParams::new(params);
        let result = dispatcher.run(&mut Board0 { fail: false }, &mut led, &mut console);
        let msg = console.return_message;
        (result, led, msg)
    }

    fn detected(bus: BusType) -> DeviceDescription {
        DeviceDescription::detected(bus, 0, 0)
    }

    #[test]
    fn test_platform_failure_runs_nothing() {
        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());

        let mut dev = DeviceDescription::zeroed();
        let mut params = InputParameters::new(Operation::Detect(DetectParams {
            bus: BusType::Spi.raw(),
            unit: 0,
            chip_select: 0,
            device: &mut dev,
        }));
        let mut console = ConsoleParams::new(&mut params);
        let mut led = Led::default();

        let result = dispatcher.run(&mut Board0 { fail: true }, &mut led, &mut console);
        assert_eq!(result, Err(Error::PlatformInit));
        assert_eq!(led.history(), &[Some(StatusSignal::Red)]);
        drop(dispatcher);
        assert_eq!(spi.calls.total(), 0);
    }

    #[test]
    fn test_wrong_param_version_is_rejected() {
        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());

        for version in [0, 0x0001_0000, 0x0002_0001, 0x0003_0000, u32::MAX] {
            let mut dev = DeviceDescription::zeroed();
            let mut params = InputParameters::new(Operation::Detect(DetectParams {
                bus: BusType::Spi.raw(),
                unit: 0,
                chip_select: 0,
                device: &mut dev,
            }));
            params.param_version = version;

            let (result, led, _) = run(&mut dispatcher, &mut params);
            assert_eq!(result, Err(Error::UnknownParamVersion(version)));
            assert_eq!(
                led.history(),
                &[Some(StatusSignal::Off), Some(StatusSignal::Red)]
            );
        }

        drop(dispatcher);
        assert_eq!(spi.calls.total(), 0);
    }

    #[test]
    fn test_wrong_version_beats_unknown_mode() {
        let mut dispatcher = Dispatcher::new(BusRouter::new(), Board::default());
        let mut params = InputParameters::new(Operation::Unknown(77));
        params.param_version = 0x0001_0000;
        let (result, _, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Err(Error::UnknownParamVersion(0x0001_0000)));
    }

    #[test]
    fn test_unknown_operation_ends_red() {
        let mut dispatcher = Dispatcher::new(BusRouter::new(), Board::default());
        for code in [9, 100, u32::MAX] {
            let mut params = InputParameters::new(Operation::Unknown(code));
            let (result, led, _) = run(&mut dispatcher, &mut params);
            assert_eq!(result, Err(Error::UnknownOperationMode(code)));
            assert_eq!(
                led.history(),
                &[Some(StatusSignal::Off), Some(StatusSignal::Red)]
            );
        }
    }

    #[test]
    fn test_known_code_without_payload_ends_red() {
        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        for code in [0, 5, 8] {
            let mut params = InputParameters::new(Operation::Unknown(code));
            let (result, led, msg) = run(&mut dispatcher, &mut params);
            assert_eq!(result, Err(Error::UnknownOperationMode(code)));
            assert_eq!(
                led.history(),
                &[Some(StatusSignal::Off), Some(StatusSignal::Red)]
            );
            assert_eq!(msg, None);
        }
        drop(dispatcher);
        assert_eq!(spi.calls.total(), 0);
    }

    #[cfg(not(feature = "checksum"))]
    #[test]
    fn test_checksum_code_unknown_without_feature() {
        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        let mut params = InputParameters::new(Operation::Unknown(OperationMode::Checksum.raw()));
        let (result, led, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Err(Error::UnknownOperationMode(4)));
        assert_eq!(
            led.history(),
            &[Some(StatusSignal::Off), Some(StatusSignal::Red)]
        );
        assert!(!OperationMode::Checksum.is_supported());
        drop(dispatcher);
        assert_eq!(spi.calls.total(), 0);
    }

    #[test]
    fn test_success_ends_green() {
        let mut dispatcher = Dispatcher::new(BusRouter::new(), Board::default());
        let mut buf = [0u8; 64];
        let mut params = InputParameters::new(Operation::GetBoardInfo(BoardInfoParams {
            bus_id: ALL,
            unit_id: 0,
            buffer: &mut buf,
        }));
        let (result, led, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        assert_eq!(
            led.history(),
            &[Some(StatusSignal::Off), Some(StatusSignal::Green)]
        );
    }

    #[test]
    fn test_detect_twice_is_identical() {
        let mut par = MockBackend::new(BusType::ParallelFlash);
        let mut dispatcher = Dispatcher::new(
            BusRouter::new().with(BusType::ParallelFlash, &mut par),
            Board::default(),
        );

        let mut first = DeviceDescription::zeroed();
        let mut second = DeviceDescription::zeroed();
        for dev in [&mut first, &mut second] {
            let mut params = InputParameters::new(Operation::Detect(DetectParams {
                bus: BusType::ParallelFlash.raw(),
                unit: 1,
                chip_select: 0,
                device: dev,
            }));
            let (result, _, _) = run(&mut dispatcher, &mut params);
            assert_eq!(result, Ok(()));
        }

        assert_eq!(first, second);
        assert!(first.is_valid());
        assert_eq!(first.size_this, DESCRIPTION_SIZE);
        assert_eq!(first.version, FLASHER_INTERFACE_VERSION);
        assert_eq!(first.bus, BusType::ParallelFlash.raw());
    }

    #[test]
    fn test_detect_unknown_bus() {
        let mut dispatcher = Dispatcher::new(BusRouter::new(), Board::default());
        let mut dev = detected(BusType::Spi);
        let mut params = InputParameters::new(Operation::Detect(DetectParams {
            bus: 5,
            unit: 0,
            chip_select: 0,
            device: &mut dev,
        }));
        let (result, led, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Err(Error::IllegalDevice(5)));
        assert_eq!(led.history().last(), Some(&Some(StatusSignal::Red)));
        drop(params);
        assert!(!dev.is_valid());
    }

    #[test]
    fn test_every_operation_routes_to_its_bus() {
        for bus in BusType::ALL {
            let mut par = MockBackend::new(BusType::ParallelFlash);
            let mut spi = MockBackend::new(BusType::Spi);
            let mut dispatcher = Dispatcher::new(
                BusRouter::new()
                    .with(BusType::ParallelFlash, &mut par)
                    .with(BusType::Spi, &mut spi),
                Board::default(),
            )
            .with_policy(DescriptorPolicy::Strict);

            let dev = detected(bus);
            let mut out = DeviceDescription::zeroed();
            let mut read_buf = [0u8; 16];
            let mut info_buf = [0u8; 64];
            let data = [0u8; 16];

            let ops = [
                Operation::Detect(DetectParams {
                    bus: bus.raw(),
                    unit: 0,
                    chip_select: 0,
                    device: &mut out,
                }),
                Operation::Flash(FlashParams {
                    device: Some(&dev),
                    start: 0,
                    data: &data,
                }),
                Operation::Erase(EraseParams {
                    device: Some(&dev),
                    start: 0,
                    end: 0x1000,
                }),
                Operation::Read(ReadParams {
                    device: Some(&dev),
                    start: 0,
                    buffer: &mut read_buf,
                }),
                Operation::Verify(VerifyParams {
                    device: Some(&dev),
                    start: 0,
                    data: &data,
                }),
                #[cfg(feature = "checksum")]
                Operation::Checksum(ChecksumParams {
                    device: Some(&dev),
                    start: 0,
                    end: 16,
                    digest: [0; 20],
                }),
                Operation::IsErased(IsErasedParams {
                    device: Some(&dev),
                    start: 0,
                    end: 16,
                }),
                Operation::GetEraseArea(EraseAreaParams {
                    device: Some(&dev),
                    start: 0,
                    end: 16,
                }),
                Operation::GetBoardInfo(BoardInfoParams {
                    bus_id: bus.raw(),
                    unit_id: ALL,
                    buffer: &mut info_buf,
                }),
            ];

            for op in ops {
                let mut params = InputParameters::new(op);
                let (result, _, _) = run(&mut dispatcher, &mut params);
                assert_eq!(result, Ok(()), "bus {:?} op {}", bus, params.operation.code());
            }
            drop(dispatcher);

            let (hit, miss) = match bus {
                BusType::ParallelFlash => (&par, &spi),
                BusType::Spi => (&spi, &par),
            };
            assert_eq!(miss.calls.total(), 0);
            assert_eq!(hit.calls.detect, 1);
            assert_eq!(hit.calls.flash, 1);
            assert_eq!(hit.calls.erase, 1);
            assert_eq!(hit.calls.read, 1);
            assert_eq!(hit.calls.verify, 1);
            #[cfg(feature = "checksum")]
            assert_eq!(hit.calls.checksum, 1);
            assert_eq!(hit.calls.is_erased, 1);
            assert_eq!(hit.calls.get_erase_area, 1);
        }
    }

    #[test]
    fn test_range_errors_never_reach_backend() {
        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        let dev = detected(BusType::Spi);

        for (start, end) in [(0, 0), (0x100, 0xFF), (u32::MAX, 0)] {
            let mut params = InputParameters::new(Operation::IsErased(IsErasedParams {
                device: Some(&dev),
                start,
                end,
            }));
            let (result, _, msg) = run(&mut dispatcher, &mut params);
            assert_eq!(result, Err(Error::InvalidRange { start, end }));
            assert_eq!(msg, None);

            let mut params = InputParameters::new(Operation::GetEraseArea(EraseAreaParams {
                device: Some(&dev),
                start,
                end,
            }));
            let (result, _, _) = run(&mut dispatcher, &mut params);
            assert_eq!(result, Err(Error::InvalidRange { start, end }));
        }

        drop(dispatcher);
        assert_eq!(spi.calls.total(), 0);
    }

    #[test]
    fn test_out_of_band_values() {
        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        let dev = detected(BusType::Spi);

        let mut params = InputParameters::new(Operation::IsErased(IsErasedParams {
            device: Some(&dev),
            start: 0,
            end: 0x100,
        }));
        let (result, _, msg) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        assert_eq!(msg, Some(0xFF));

        let mut params = InputParameters::new(Operation::Verify(VerifyParams {
            device: Some(&dev),
            start: 0,
            data: &[0xA5; 4],
        }));
        let (result, _, msg) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        assert_eq!(msg, Some(0));
    }

    #[test]
    fn test_board_info_enumeration() {
        let board = Board::default();
        let mut dispatcher = Dispatcher::new(BusRouter::new(), board);

        let mut expected = [0u8; 64];
        let bus_len = board.make_bus_table(&mut expected);

        let mut buf = [0u8; 64];
        let mut params = InputParameters::new(Operation::GetBoardInfo(BoardInfoParams {
            bus_id: ALL,
            unit_id: 3,
            buffer: &mut buf,
        }));
        let (result, _, msg) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        assert_eq!(msg, Some(bus_len));
        drop(params);
        assert_eq!(&buf[..bus_len], &expected[..bus_len]);

        let unit_len = board.make_unit_table(BusType::ParallelFlash.raw(), &mut expected);
        let mut params = InputParameters::new(Operation::GetBoardInfo(BoardInfoParams {
            bus_id: BusType::ParallelFlash.raw(),
            unit_id: ALL,
            buffer: &mut buf,
        }));
        let (result, _, msg) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        assert_eq!(msg, Some(unit_len));

        let mut params = InputParameters::new(Operation::GetBoardInfo(BoardInfoParams {
            bus_id: BusType::ParallelFlash.raw(),
            unit_id: 0,
            buffer: &mut buf,
        }));
        let (result, led, msg) = run(&mut dispatcher, &mut params);
        assert_eq!(
            result,
            Err(Error::UnitInfoUnsupported { bus: 0, unit: 0 })
        );
        assert_eq!(msg, None);
        assert_eq!(led.history().last(), Some(&Some(StatusSignal::Red)));
    }

    #[test]
    fn test_board_info_respects_capacity() {
        let mut dispatcher = Dispatcher::new(BusRouter::new(), Board::default());
        let mut buf = [0u8; 4];
        let mut params = InputParameters::new(Operation::GetBoardInfo(BoardInfoParams {
            bus_id: ALL,
            unit_id: ALL,
            buffer: &mut buf,
        }));
        let (result, _, msg) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        assert_eq!(msg, Some(0));
    }

    #[test]
    fn test_descriptor_policy() {
        let mut stale = detected(BusType::Spi);
        stale.size_this = DESCRIPTION_SIZE - 4;

        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        assert_eq!(dispatcher.policy(), DescriptorPolicy::Permissive);

        let mut buf = [0u8; 8];
        let mut params = InputParameters::new(Operation::Read(ReadParams {
            device: Some(&stale),
            start: 0,
            buffer: &mut buf,
        }));
        let (result, _, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));

        let mut dispatcher = dispatcher.with_policy(DescriptorPolicy::Strict);
        let mut params = InputParameters::new(Operation::Read(ReadParams {
            device: Some(&stale),
            start: 0,
            buffer: &mut buf,
        }));
        let (result, _, _) = run(&mut dispatcher, &mut params);
        assert_eq!(
            result,
            Err(Error::Descriptor(DescriptorError::SizeMismatch {
                expected: DESCRIPTION_SIZE,
                found: DESCRIPTION_SIZE - 4
            }))
        );

        drop(dispatcher);
        assert_eq!(spi.calls.read, 1);
    }

    #[test]
    fn test_backend_error_passes_through() {
        let mut spi = MockBackend::failing(BusType::Spi, Error::EraseError);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        let dev = detected(BusType::Spi);
        let mut params = InputParameters::new(Operation::Erase(EraseParams {
            device: Some(&dev),
            start: 0,
            end: 0x1000,
        }));
        let (result, led, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Err(Error::EraseError));
        assert_eq!(
            led.history(),
            &[Some(StatusSignal::Off), Some(StatusSignal::Red)]
        );
    }

    #[cfg(feature = "checksum")]
    #[test]
    fn test_checksum_digest_only_on_success() {
        use crate::checksum::{Digest, Sha1};

        let dev = detected(BusType::Spi);

        let mut spi = MockBackend::new(BusType::Spi);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut spi), Board::default());
        let mut params = InputParameters::new(Operation::Checksum(ChecksumParams {
            device: Some(&dev),
            start: 0,
            end: 4,
            digest: [0; 20],
        }));
        let (result, _, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Ok(()));
        let expected: [u8; 20] = Sha1::digest([0xA5u8; 4]).into();
        match &params.operation {
            Operation::Checksum(p) => assert_eq!(p.digest, expected),
            _ => unreachable!(),
        }

        let mut broken = MockBackend::failing(BusType::Spi, Error::ReadError);
        let mut dispatcher =
            Dispatcher::new(BusRouter::new().with(BusType::Spi, &mut broken), Board::default());
        let mut params = InputParameters::new(Operation::Checksum(ChecksumParams {
            device: Some(&dev),
            start: 0,
            end: 4,
            digest: [0x11; 20],
        }));
        let (result, _, _) = run(&mut dispatcher, &mut params);
        assert_eq!(result, Err(Error::ReadError));
        match &params.operation {
            Operation::Checksum(p) => assert_eq!(p.digest, [0x11; 20]),
            _ => unreachable!(),
        }
    }
}
