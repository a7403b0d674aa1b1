//! Emulated board session
//!
//! Owns the emulated devices of a board file and runs one dispatcher call
//! against them at a time, the way the bootloader would run one call per
//! entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nxflasher_core::params::{ConsoleParams, InputParameters, Operation};
use nxflasher_core::{BusRouter, DescriptorPolicy, DeviceDescription, Dispatcher, FlashBackend};
use nxflasher_emu::{EmuPlatform, EmulatedFlash, LedLog};
use thiserror::Error;

use crate::config::BoardConfig;

/// Host side file errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// A file could not be read or written
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An image is larger than its device
    #[error("Image {path} is {len} bytes but the device holds {capacity}")]
    ImageTooLarge {
        path: PathBuf,
        len: usize,
        capacity: usize,
    },

    /// A descriptor file has the wrong size
    #[error("Descriptor {path} is not valid: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: nxflasher_core::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SessionError + '_ {
    move |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Result of one call
#[derive(Debug)]
pub struct Reply<'o> {
    /// The operation with its outputs filled in
    pub operation: Operation<'o>,
    /// Out-of-band return value
    pub return_message: Option<usize>,
}

struct Device {
    flash: EmulatedFlash,
    image: Option<PathBuf>,
}

/// Emulated board with its devices
pub struct Session {
    config: BoardConfig,
    devices: Vec<Device>,
    policy: DescriptorPolicy,
    param_version: u32,
}

impl Session {
    /// Create the board's devices, loading backing images that exist
    pub fn open(config: BoardConfig) -> Result<Self, SessionError> {
        let mut devices = Vec::with_capacity(config.devices.len());
        for device in &config.devices {
            let flash = match &device.image {
                Some(path) if path.exists() => {
                    let data = fs::read(path).map_err(io_error(path))?;
                    if data.len() > device.emu.size {
                        return Err(SessionError::ImageTooLarge {
                            path: path.clone(),
                            len: data.len(),
                            capacity: device.emu.size,
                        });
                    }
                    log::debug!("Loaded {} bytes from {}", data.len(), path.display());
                    EmulatedFlash::with_data(device.emu.clone(), &data)
                }
                _ => EmulatedFlash::new(device.emu.clone()),
            };
            log::debug!(
                "Emulating {} bytes of {} flash",
                device.emu.size,
                device.emu.bus
            );
            devices.push(Device {
                flash,
                image: device.image.clone(),
            });
        }

        Ok(Self {
            param_version: nxflasher_core::PARAM_VERSION,
            policy: DescriptorPolicy::default(),
            config,
            devices,
        })
    }

    /// Use `policy` for descriptor checks
    pub fn with_policy(mut self, policy: DescriptorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Send `version` instead of the current parameter version
    pub fn with_param_version(mut self, version: u32) -> Self {
        self.param_version = version;
        self
    }

    /// Emulated device on `bus`, if the board has one
    #[cfg(test)]
    pub fn flash(&self, bus: nxflasher_core::BusType) -> Option<&EmulatedFlash> {
        self.devices
            .iter()
            .map(|device| &device.flash)
            .find(|flash| flash.config().bus == bus)
    }

    /// Run one dispatcher call
    pub fn call<'o>(
        &mut self,
        operation: Operation<'o>,
    ) -> Result<Reply<'o>, nxflasher_core::Error> {
        let mut params = InputParameters::new(operation);
        params.param_version = self.param_version;

        let mut platform = EmuPlatform::new();
        let mut led = LedLog::new();
        let policy = self.policy;
        let devices = &mut self.devices;

        let (result, return_message) = self.config.with_board(|board| {
            let mut router = BusRouter::new();
            for device in devices.iter_mut() {
                let bus = device.flash.config().bus;
                let backend: &mut dyn FlashBackend = &mut device.flash;
                router.register(bus, backend);
            }

            let mut dispatcher = Dispatcher::new(router, board).with_policy(policy);
            let mut console = ConsoleParams::new(&mut params);
            let result = dispatcher.run(&mut platform, &mut led, &mut console);
            (result, console.return_message)
        });

        result?;

        Ok(Reply {
            operation: params.operation,
            return_message,
        })
    }

    /// Write every device with a backing image back to disk
    pub fn save(&self) -> Result<(), SessionError> {
        for device in &self.devices {
            if let Some(path) = &device.image {
                fs::write(path, device.flash.data()).map_err(io_error(path))?;
                log::info!("Wrote {} bytes to {}", device.flash.data().len(), path.display());
            }
        }
        Ok(())
    }
}

/// Load a descriptor saved by `detect`; a missing file means no descriptor
pub fn load_descriptor(path: &Path) -> Result<Option<DeviceDescription>, SessionError> {
    if !path.exists() {
        log::debug!("No descriptor at {}", path.display());
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(io_error(path))?;
    DeviceDescription::from_bytes(&bytes)
        .map(Some)
        .map_err(|source| SessionError::Descriptor {
            path: path.to_path_buf(),
            source,
        })
}

/// Save a descriptor for later calls
pub fn save_descriptor(path: &Path, device: &DeviceDescription) -> Result<(), SessionError> {
    fs::write(path, device.as_bytes()).map_err(io_error(path))
}
