//! Board file parsing
//!
//! A board file describes the buses and units the emulated board reports
//! and the flash devices attached to it:
//!
//! ```toml
//! [board]
//! name = "NXHX 500"
//!
//! [[bus]]
//! type = "spi"
//! name = "Serial Flash"
//!
//! [[bus.unit]]
//! id = 0
//! name = "SPI0"
//!
//! [[device]]
//! bus = "spi"
//! size = "16 MiB"
//! sector_size = "4 KiB"
//! page_size = 256
//! id = [0xEF, 0x40, 0x18]
//! image = "spi0.bin"
//! ```
//!
//! Without `[[bus]]` entries the default netX bus table is reported.
//! Image paths are relative to the board file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use nxflasher_core::units::{BusEntry, UnitEntry};
use nxflasher_core::{Board, BusType};
use nxflasher_emu::EmuConfig;
use thiserror::Error;

use crate::cli::parse_hex_u32;

/// Board file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Board file could not be read
    #[error("Failed to read board file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Board file is not valid TOML or has unknown fields
    #[error("Failed to parse board file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two devices were configured on the same bus
    #[error("More than one device on bus '{0}'")]
    DuplicateDevice(BusKind),

    /// Device geometry makes no sense
    #[error("Invalid geometry for device on bus '{bus}': {message}")]
    Geometry { bus: BusKind, message: String },

    /// A bus or unit name contains a NUL byte
    #[error("Name '{0}' contains a NUL byte")]
    InvalidName(String),
}

/// Bus names used in board files and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Parallel NOR flash
    Parallel,
    /// SPI flash
    Spi,
}

impl From<BusKind> for BusType {
    fn from(kind: BusKind) -> Self {
        match kind {
            BusKind::Parallel => BusType::ParallelFlash,
            BusKind::Spi => BusType::Spi,
        }
    }
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Spi => write!(f, "spi"),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct BoardFile {
    board: Option<BoardMeta>,
    #[serde(default)]
    bus: Vec<BusSection>,
    #[serde(default)]
    device: Vec<DeviceSection>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct BoardMeta {
    name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct BusSection {
    #[serde(rename = "type")]
    kind: BusKind,
    name: String,
    #[serde(default)]
    unit: Vec<UnitSection>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitSection {
    id: u8,
    name: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceSection {
    bus: BusKind,
    #[serde(default)]
    unit: u32,
    #[serde(default)]
    chip_select: u32,
    #[serde(deserialize_with = "deserialize_size")]
    size: u32,
    #[serde(deserialize_with = "deserialize_size")]
    sector_size: u32,
    #[serde(default = "default_page_size", deserialize_with = "deserialize_size")]
    page_size: u32,
    #[serde(default)]
    id: Vec<u8>,
    image: Option<PathBuf>,
}

fn default_page_size() -> u32 {
    256
}

/// Deserialize a size that can be an integer or a string like "64 KiB"
fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeOrInt {
        Int(u32),
        Str(String),
    }

    match SizeOrInt::deserialize(deserializer)? {
        SizeOrInt::Int(n) => Ok(n),
        SizeOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a size string like "16 MiB", "0x1000" or "4096"
pub fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Ok(n) = parse_hex_u32(s) {
        return Ok(n);
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix('b') {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let n: u32 = num_str
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

/// One unit of a configured bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConfig {
    pub id: u8,
    pub name: String,
}

/// One configured bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub bus: BusType,
    pub name: String,
    pub units: Vec<UnitConfig>,
}

/// One emulated flash device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub emu: EmuConfig,
    /// Backing image, already resolved against the board file location
    pub image: Option<PathBuf>,
}

/// Parsed board file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub name: String,
    pub buses: Vec<BusConfig>,
    pub devices: Vec<DeviceConfig>,
}

impl Default for BoardConfig {
    /// A board with one erased SPI flash and one parallel flash, no images
    fn default() -> Self {
        Self {
            name: "emulated".to_string(),
            buses: Vec::new(),
            devices: vec![
                DeviceConfig {
                    emu: EmuConfig::parallel(),
                    image: None,
                },
                DeviceConfig {
                    emu: EmuConfig::spi(),
                    image: None,
                },
            ],
        }
    }
}

impl BoardConfig {
    /// Load a board file from disk
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml(&content, base)
    }

    /// Parse a board file; relative image paths are joined to `base`
    pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let file: BoardFile = toml::from_str(content)?;

        let mut buses = Vec::with_capacity(file.bus.len());
        for section in file.bus {
            check_name(&section.name)?;
            let mut units = Vec::with_capacity(section.unit.len());
            for unit in section.unit {
                check_name(&unit.name)?;
                units.push(UnitConfig {
                    id: unit.id,
                    name: unit.name,
                });
            }
            buses.push(BusConfig {
                bus: section.kind.into(),
                name: section.name,
                units,
            });
        }

        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(file.device.len());
        for section in file.device {
            if !seen.insert(section.bus) {
                return Err(ConfigError::DuplicateDevice(section.bus));
            }
            devices.push(device_config(section, base)?);
        }

        Ok(Self {
            name: file
                .board
                .and_then(|meta| meta.name)
                .unwrap_or_else(|| "unnamed".to_string()),
            buses,
            devices,
        })
    }

    /// Run `f` with the bus table this board reports
    pub fn with_board<R>(&self, f: impl FnOnce(Board<'_>) -> R) -> R {
        if self.buses.is_empty() {
            return f(Board::default());
        }

        let units: Vec<Vec<UnitEntry<'_>>> = self
            .buses
            .iter()
            .map(|bus| {
                bus.units
                    .iter()
                    .map(|unit| UnitEntry {
                        id: unit.id,
                        name: &unit.name,
                    })
                    .collect()
            })
            .collect();
        let buses: Vec<BusEntry<'_>> = self
            .buses
            .iter()
            .zip(&units)
            .map(|(bus, units)| BusEntry {
                bus: bus.bus,
                name: &bus.name,
                units,
            })
            .collect();

        f(Board::new(&buses))
    }
}

fn check_name(name: &str) -> Result<(), ConfigError> {
    if name.contains('\0') {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn device_config(section: DeviceSection, base: &Path) -> Result<DeviceConfig, ConfigError> {
    let geometry = |message: String| ConfigError::Geometry {
        bus: section.bus,
        message,
    };

    if section.sector_size == 0 || !section.sector_size.is_power_of_two() {
        return Err(geometry(format!(
            "sector size {} is not a power of two",
            section.sector_size
        )));
    }
    if section.size == 0 || section.size % section.sector_size != 0 {
        return Err(geometry(format!(
            "size {} is not a multiple of the sector size {}",
            section.size, section.sector_size
        )));
    }

    let image = section.image.as_ref().map(|path| {
        if path.is_absolute() {
            path.clone()
        } else {
            base.join(path)
        }
    });

    Ok(DeviceConfig {
        emu: EmuConfig {
            bus: section.bus.into(),
            unit: section.unit,
            chip_select: section.chip_select,
            size: section.size as usize,
            sector_size: section.sector_size as usize,
            page_size: section.page_size as usize,
            id: section.id,
        },
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"
[board]
name = "test board"

[[bus]]
type = "spi"
name = "Serial Flash"

[[bus.unit]]
id = 0
name = "SPI0"

[[bus.unit]]
id = 1
name = "SPI1"

[[device]]
bus = "spi"
chip_select = 1
size = "1 MiB"
sector_size = "4 KiB"
id = [0xEF, 0x40, 0x14]
image = "spi.bin"

[[device]]
bus = "parallel"
size = 0x400000
sector_size = 0x10000
page_size = 32
"#;

    #[test]
    fn test_parse_board() {
        let config = BoardConfig::from_toml(BOARD, Path::new("/boards")).unwrap();
        assert_eq!(config.name, "test board");
        assert_eq!(config.buses.len(), 1);
        assert_eq!(config.buses[0].bus, BusType::Spi);
        assert_eq!(config.buses[0].units[1].name, "SPI1");

        let spi = &config.devices[0];
        assert_eq!(spi.emu.bus, BusType::Spi);
        assert_eq!(spi.emu.chip_select, 1);
        assert_eq!(spi.emu.size, 1024 * 1024);
        assert_eq!(spi.emu.sector_size, 4096);
        assert_eq!(spi.emu.page_size, 256);
        assert_eq!(spi.image, Some(PathBuf::from("/boards/spi.bin")));

        let par = &config.devices[1];
        assert_eq!(par.emu.size, 4 * 1024 * 1024);
        assert_eq!(par.emu.page_size, 32);
        assert_eq!(par.image, None);
    }

    #[test]
    fn test_board_tables_from_config() {
        let config = BoardConfig::from_toml(BOARD, Path::new(".")).unwrap();
        let mut buf = [0u8; 64];
        let len = config.with_board(|board| board.make_unit_table(1, &mut buf));
        assert_eq!(len, 2 * ("SPI0".len() + 2));
        assert_eq!(&buf[..6], b"\x00SPI0\x00");
    }

    #[test]
    fn test_empty_board_uses_default_tables() {
        let config = BoardConfig::from_toml("", Path::new(".")).unwrap();
        assert!(config.devices.is_empty());
        let mut buf = [0u8; 64];
        let len = config.with_board(|board| board.make_bus_table(&mut buf));
        assert!(len > 0);
    }

    #[test]
    fn test_duplicate_device() {
        let content = r#"
[[device]]
bus = "spi"
size = 4096
sector_size = 4096

[[device]]
bus = "spi"
size = 4096
sector_size = 4096
"#;
        assert!(matches!(
            BoardConfig::from_toml(content, Path::new(".")),
            Err(ConfigError::DuplicateDevice(BusKind::Spi))
        ));
    }

    #[test]
    fn test_bad_geometry() {
        let content = r#"
[[device]]
bus = "parallel"
size = 6000
sector_size = 4096
"#;
        assert!(matches!(
            BoardConfig::from_toml(content, Path::new(".")),
            Err(ConfigError::Geometry { .. })
        ));
    }

    #[test]
    fn test_unknown_field() {
        let content = r#"
[[device]]
bus = "spi"
size = 4096
sector_size = 4096
colour = "blue"
"#;
        assert!(matches!(
            BoardConfig::from_toml(content, Path::new(".")),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_size("64 KiB"), Ok(64 * 1024));
        assert_eq!(parse_size("16MiB"), Ok(16 * 1024 * 1024));
        assert_eq!(parse_size("512 B"), Ok(512));
        assert!(parse_size("lots").is_err());
        assert!(parse_size("8192 MiB").is_err());
    }
}
