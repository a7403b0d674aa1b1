//! Board bus and unit tables
//!
//! Board info queries return a packed table instead of structured data so
//! the host can read it straight out of flasher memory. Each record is the
//! id byte followed by the NUL-terminated name:
//!
//! ```text
//! [id][n][a][m][e][0x00] [id][n][a][m][e][0x00] ...
//! ```
//!
//! Records are written whole. The first record that does not fit in the
//! remaining buffer ends the table.

use crate::device::BusType;

/// One unit (controller instance) on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitEntry<'a> {
    /// Unit id as used in detect parameters
    pub id: u8,
    /// Display name
    pub name: &'a str,
}

/// One bus with its units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusEntry<'a> {
    /// Bus type; its raw tag is the id in the bus table
    pub bus: BusType,
    /// Display name
    pub name: &'a str,
    /// Units on this bus
    pub units: &'a [UnitEntry<'a>],
}

const DEFAULT_BUSES: &[BusEntry<'static>] = &[
    BusEntry {
        bus: BusType::ParallelFlash,
        name: "Parallel Flash",
        units: &[
            UnitEntry { id: 0, name: "SRAM Bus CS0" },
            UnitEntry { id: 1, name: "SRAM Bus CS1" },
            UnitEntry { id: 2, name: "SRAM Bus CS2" },
            UnitEntry { id: 3, name: "SRAM Bus CS3" },
        ],
    },
    BusEntry {
        bus: BusType::Spi,
        name: "Serial Flash",
        units: &[UnitEntry { id: 0, name: "SPI0" }],
    },
];

/// The buses and units a board exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board<'a> {
    buses: &'a [BusEntry<'a>],
}

impl Default for Board<'static> {
    fn default() -> Self {
        Self::new(DEFAULT_BUSES)
    }
}

impl<'a> Board<'a> {
    /// Board with the given buses
    pub const fn new(buses: &'a [BusEntry<'a>]) -> Self {
        Self { buses }
    }

    /// All buses of the board
    pub fn buses(&self) -> &'a [BusEntry<'a>] {
        self.buses
    }

    /// Look up a bus by raw tag
    pub fn bus(&self, bus_id: u32) -> Option<&'a BusEntry<'a>> {
        self.buses.iter().find(|entry| entry.bus.raw() == bus_id)
    }

    /// Write the bus table, returning the number of bytes written
    pub fn make_bus_table(&self, buffer: &mut [u8]) -> usize {
        write_table(
            buffer,
            self.buses
                .iter()
                .map(|entry| (entry.bus.raw() as u8, entry.name)),
        )
    }

    /// Write the unit table of one bus, returning the number of bytes written
    ///
    /// A bus the board does not know has an empty table.
    pub fn make_unit_table(&self, bus_id: u32, buffer: &mut [u8]) -> usize {
        match self.bus(bus_id) {
            Some(entry) => write_table(
                buffer,
                entry.units.iter().map(|unit| (unit.id, unit.name)),
            ),
            None => {
                log::warn!("Unknown bus {} requested, unit table is empty", bus_id);
                0
            }
        }
    }
}

fn write_table<'n>(buffer: &mut [u8], records: impl Iterator<Item = (u8, &'n str)>) -> usize {
    let mut pos = 0;

    for (id, name) in records {
        let len = name.len() + 2;
        let Some(record) = buffer.get_mut(pos..pos + len) else {
            log::debug!("Table truncated at {} bytes", pos);
            break;
        };
        record[0] = id;
        record[1..len - 1].copy_from_slice(name.as_bytes());
        record[len - 1] = 0;
        pos += len;
    }

    pos
}
