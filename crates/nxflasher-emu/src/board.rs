//! Platform and status LED stand-ins

use nxflasher_core::{Error, Platform, Result, StatusIndicator, StatusSignal};

/// Platform whose initialization can be told to fail
#[derive(Debug, Default, Clone)]
pub struct EmuPlatform {
    /// Make `init` fail
    pub fail_init: bool,
    /// Number of `init` calls
    pub init_count: u32,
}

impl EmuPlatform {
    /// A platform that comes up normally
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform whose initialization fails
    pub fn broken() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }
}

impl Platform for EmuPlatform {
    fn init(&mut self) -> Result<()> {
        self.init_count += 1;
        if self.fail_init {
            log::debug!("Emulated platform init failure");
            return Err(Error::Timeout);
        }
        Ok(())
    }
}

/// Status LED that remembers every signal it was set to
#[derive(Debug, Default, Clone)]
pub struct LedLog {
    history: Vec<StatusSignal>,
}

impl LedLog {
    /// An LED that has not been set yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Every signal in the order it was set
    pub fn history(&self) -> &[StatusSignal] {
        &self.history
    }

    /// The signal currently shown
    pub fn current(&self) -> Option<StatusSignal> {
        self.history.last().copied()
    }
}

impl StatusIndicator for LedLog {
    fn set(&mut self, signal: StatusSignal) {
        log::debug!("Status LED: {:?}", signal);
        self.history.push(signal);
    }
}
