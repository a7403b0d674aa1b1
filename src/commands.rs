//! Subcommand implementations

use std::fs;
use std::path::Path;

use nxflasher_core::params::{
    BoardInfoParams, DetectParams, EraseAreaParams, EraseParams, FlashParams, IsErasedParams,
    Operation, OperationMode, ReadParams, VerifyParams,
};
use nxflasher_core::{DeviceDescription, ALL};

use crate::session::{self, Session};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Detect a device and store its descriptor at `descriptor`
///
/// The descriptor is written even when detection fails, so later commands
/// never pick up a device that is no longer there.
pub fn run_detect(
    session: &mut Session,
    descriptor: &Path,
    bus: u32,
    unit: u32,
    chip_select: u32,
) -> CommandResult {
    let mut device = DeviceDescription::zeroed();
    let result = session
        .call(Operation::Detect(DetectParams {
            bus,
            unit,
            chip_select,
            device: &mut device,
        }))
        .map(|_| ());

    // A failed detect leaves a cleared record, which replaces the old one
    session::save_descriptor(descriptor, &device)?;
    result?;

    print_device(&device);
    println!("Descriptor saved to {}", descriptor.display());
    Ok(())
}

/// Program `input` at `start`
pub fn run_flash(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    input: &Path,
    start: u32,
) -> CommandResult {
    let data = fs::read(input)?;
    println!("Read {} bytes from {}", data.len(), input.display());

    session.call(Operation::Flash(FlashParams {
        device,
        start,
        data: &data,
    }))?;
    session.save()?;

    println!("Programmed {} bytes at 0x{:08X}", data.len(), start);
    Ok(())
}

/// Erase `start..end`
pub fn run_erase(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    start: u32,
    end: u32,
) -> CommandResult {
    session.call(Operation::Erase(EraseParams { device, start, end }))?;
    session.save()?;

    println!("Erased 0x{:08X}..0x{:08X}", start, end);
    Ok(())
}

/// Read `length` bytes from `start` into `output`
pub fn run_read(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    start: u32,
    length: u32,
    output: &Path,
) -> CommandResult {
    let mut buffer = vec![0u8; length as usize];
    session.call(Operation::Read(ReadParams {
        device,
        start,
        buffer: &mut buffer,
    }))?;

    fs::write(output, &buffer)?;
    println!("Wrote {} bytes to {}", buffer.len(), output.display());
    Ok(())
}

/// Compare the device against `input` at `start`
pub fn run_verify(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    input: &Path,
    start: u32,
) -> CommandResult {
    let data = fs::read(input)?;
    let reply = session.call(Operation::Verify(VerifyParams {
        device,
        start,
        data: &data,
    }))?;

    match reply.return_message {
        Some(0) => {
            println!("Verification passed!");
            Ok(())
        }
        Some(_) => Err("Verification failed: flash contents differ".into()),
        None => Err("Verification produced no result".into()),
    }
}

/// Print the SHA-1 of `start..end`
#[cfg(feature = "checksum")]
pub fn run_checksum(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    start: u32,
    end: u32,
) -> CommandResult {
    use nxflasher_core::params::ChecksumParams;

    let reply = session.call(Operation::Checksum(ChecksumParams {
        device,
        start,
        end,
        digest: [0; nxflasher_core::checksum::DIGEST_LEN],
    }))?;

    if let Operation::Checksum(params) = reply.operation {
        let hex: String = params.digest.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{}", hex);
    }
    Ok(())
}

/// Report whether `start..end` is erased
pub fn run_is_erased(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    start: u32,
    end: u32,
) -> CommandResult {
    let reply = session.call(Operation::IsErased(IsErasedParams { device, start, end }))?;

    match reply.return_message {
        Some(0xFF) => println!("0x{:08X}..0x{:08X} is erased", start, end),
        Some(_) => println!("0x{:08X}..0x{:08X} is not erased", start, end),
        None => return Err("Erase check produced no result".into()),
    }
    Ok(())
}

/// Print the erase blocks covering `start..end`
pub fn run_erase_area(
    session: &mut Session,
    device: Option<&DeviceDescription>,
    start: u32,
    end: u32,
) -> CommandResult {
    let reply = session.call(Operation::GetEraseArea(EraseAreaParams { device, start, end }))?;

    if let Operation::GetEraseArea(params) = reply.operation {
        println!(
            "Erase area: 0x{:08X}..0x{:08X} ({} bytes)",
            params.start,
            params.end,
            params.end - params.start
        );
    }
    Ok(())
}

/// Print the bus table, or the unit table of `bus`
pub fn run_board_info(
    session: &mut Session,
    bus: u32,
    unit: u32,
    capacity: usize,
) -> CommandResult {
    let mut buffer = vec![0u8; capacity];
    let reply = session.call(Operation::GetBoardInfo(BoardInfoParams {
        bus_id: bus,
        unit_id: unit,
        buffer: &mut buffer,
    }))?;

    let len = reply.return_message.unwrap_or(0);
    if len == 0 {
        println!("No entries");
        return Ok(());
    }

    let kind = if bus == ALL { "Bus" } else { "Unit" };
    for (id, name) in parse_table(&buffer[..len]) {
        println!("{} {}: {}", kind, id, name);
    }
    Ok(())
}

/// Send a bare operation code
///
/// Codes that have a subcommand are refused, they need their parameters.
pub fn run_raw(session: &mut Session, code: u32) -> CommandResult {
    check_raw_code(code)?;
    session.call(Operation::Unknown(code))?;
    Ok(())
}

fn check_raw_code(code: u32) -> Result<(), String> {
    match OperationMode::from_raw(code) {
        Some(mode) if mode.is_supported() => Err(format!(
            "Operation code {} ({}) needs parameters, use its subcommand",
            code, mode
        )),
        _ => Ok(()),
    }
}

/// Split an id/name table into its records
fn parse_table(table: &[u8]) -> Vec<(u8, String)> {
    let mut records = Vec::new();
    let mut rest = table;
    while let Some((&id, tail)) = rest.split_first() {
        let Some(nul) = tail.iter().position(|&b| b == 0) else {
            break;
        };
        records.push((id, String::from_utf8_lossy(&tail[..nul]).into_owned()));
        rest = &tail[nul + 1..];
    }
    records
}

fn print_device(device: &DeviceDescription) {
    let bus = device
        .bus_type()
        .map(|bus| bus.name())
        .unwrap_or("unknown");
    println!("Found: {} unit {} cs {}", bus, device.unit, device.chip_select);
    println!(
        "  {} bytes, {} byte sectors, {} byte pages",
        device.device_size, device.sector_size, device.page_size
    );
    let id: Vec<String> = device
        .id
        .iter()
        .rev()
        .skip_while(|&&b| b == 0)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|b| format!("{:02X}", b))
        .collect();
    if !id.is_empty() {
        println!("  ID: {}", id.join(" "));
    }
}
