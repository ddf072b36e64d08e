use crate::commands::executable::Executable;
use crate::commands::CommandError;
use crate::frame::op;
use crate::store::{Mode, Store};

/// Moves the store into another mode. Takes effect for every operation that starts afterwards.
#[derive(Debug, PartialEq)]
pub struct SwitchMode {
    pub mode: Mode,
}

impl SwitchMode {
    pub fn from_operation_code(code: u32) -> Option<SwitchMode> {
        let mode = match code {
            op::SWITCH_MAINTENANCE => Mode::Maintenance,
            op::SWITCH_READ_WRITE => Mode::ReadWrite,
            op::SWITCH_READ_ONLY => Mode::ReadOnly,
            _ => return None,
        };

        Some(SwitchMode { mode })
    }

    pub fn operation_code(&self) -> u32 {
        match self.mode {
            Mode::Maintenance => op::SWITCH_MAINTENANCE,
            Mode::ReadWrite => op::SWITCH_READ_WRITE,
            Mode::ReadOnly => op::SWITCH_READ_ONLY,
        }
    }
}

impl Executable for SwitchMode {
    fn exec(self, store: &Store) -> Result<String, CommandError> {
        store.set_mode(self.mode);
        Ok(String::new())
    }
}
