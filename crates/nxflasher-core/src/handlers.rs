//! Operation handlers
//!
//! One function per operation. Each checks the preconditions of its mode,
//! resolves the back end and returns the back end's result unchanged.

use crate::backend::{BusRouter, FlashBackend};
#[cfg(feature = "checksum")]
use crate::checksum::{Accumulator, Digest};
use crate::device::{validate, DescriptorPolicy, DeviceDescription};
use crate::error::{DescriptorError, Error, Result};
#[cfg(feature = "checksum")]
use crate::params::ChecksumParams;
use crate::params::{
    BoardInfoParams, DetectParams, EraseAreaParams, EraseParams, FlashParams, IsErasedParams,
    ReadParams, VerifyParams,
};
use crate::units::Board;
use crate::ALL;

/// Validate the descriptor and find the back end for its bus
///
/// In permissive mode a failed validation is only reported and the bus tag
/// is read from the record anyway. A missing record has no tag to read.
fn route_device<'r, 'a>(
    router: &'r mut BusRouter<'a>,
    policy: DescriptorPolicy,
    device: Option<&DeviceDescription>,
) -> Result<&'r mut (dyn FlashBackend + 'a)> {
    if let Err(e) = validate(device) {
        if policy == DescriptorPolicy::Strict {
            return Err(e.into());
        }
        log::warn!("Trying the operation with an unverified device description");
    }

    let device = device.ok_or(Error::Descriptor(DescriptorError::Missing))?;
    router.resolve(device.bus)
}

fn check_range(start: u32, end: u32) -> Result<()> {
    if start >= end {
        log::error!(
            "First address is greater or equal than last address: 0x{:08X} >= 0x{:08X}",
            start,
            end
        );
        return Err(Error::InvalidRange { start, end });
    }
    Ok(())
}

pub(crate) fn detect(router: &mut BusRouter<'_>, params: &mut DetectParams<'_>) -> Result<()> {
    // Never leave a stale description behind, even if detection fails
    params.device.clear();

    let backend = router.resolve(params.bus)?;
    backend.detect(params)
}

pub(crate) fn flash(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &FlashParams<'_>,
) -> Result<()> {
    let backend = route_device(router, policy, params.device)?;
    backend.flash(params)
}

pub(crate) fn erase(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &EraseParams<'_>,
) -> Result<()> {
    let backend = route_device(router, policy, params.device)?;
    backend.erase(params)
}

pub(crate) fn read(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &mut ReadParams<'_>,
) -> Result<()> {
    let backend = route_device(router, policy, params.device)?;
    backend.read(params)
}

pub(crate) fn verify(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &VerifyParams<'_>,
    return_message: &mut Option<usize>,
) -> Result<()> {
    let backend = route_device(router, policy, params.device)?;
    backend.verify(params, return_message)
}

#[cfg(feature = "checksum")]
pub(crate) fn checksum(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &mut ChecksumParams<'_>,
) -> Result<()> {
    let mut hasher = Accumulator::new();

    let backend = route_device(router, policy, params.device)?;
    backend.checksum(params, &mut hasher)?;

    // Only a complete stream produces a digest
    params.digest = hasher.finalize().into();
    log::info!("SHA1: {:02x?}", params.digest);
    Ok(())
}

pub(crate) fn is_erased(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &IsErasedParams<'_>,
    return_message: &mut Option<usize>,
) -> Result<()> {
    check_range(params.start, params.end)?;

    let backend = route_device(router, policy, params.device)?;
    backend.is_erased(params, return_message)
}

pub(crate) fn get_erase_area(
    router: &mut BusRouter<'_>,
    policy: DescriptorPolicy,
    params: &mut EraseAreaParams<'_>,
) -> Result<()> {
    check_range(params.start, params.end)?;

    let backend = route_device(router, policy, params.device)?;
    backend.get_erase_area(params)?;

    log::info!(
        "Erase area: 0x{:08X} - 0x{:08X}",
        params.start,
        params.end
    );
    Ok(())
}

pub(crate) fn get_board_info(
    board: &Board<'_>,
    params: &mut BoardInfoParams<'_>,
    return_message: &mut Option<usize>,
) -> Result<()> {
    if params.bus_id == ALL {
        let len = board.make_bus_table(params.buffer);
        log::debug!("Bus table: {} bytes", len);
        *return_message = Some(len);
        Ok(())
    } else if params.unit_id == ALL {
        let len = board.make_unit_table(params.bus_id, params.buffer);
        log::debug!("Unit table of bus {}: {} bytes", params.bus_id, len);
        *return_message = Some(len);
        Ok(())
    } else {
        // No per-unit info yet
        log::error!(
            "No info available for bus {} unit {}",
            params.bus_id,
            params.unit_id
        );
        *return_message = None;
        Err(Error::UnitInfoUnsupported {
            bus: params.bus_id,
            unit: params.unit_id,
        })
    }
}
