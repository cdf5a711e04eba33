use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Whether the control loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Continue,
    Exit,
}

/// One-byte commands from the companion app or the input link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    PowerOn,
    PowerOff,
    PostureOn,
    PostureOff,
    Calibrate,
    Exit,
}

impl Command {
    pub fn from_byte(byte: u8) -> Result<Self, MonitorError> {
        match byte {
            b'1' => Ok(Command::PowerOn),
            b'2' => Ok(Command::PowerOff),
            b'P' => Ok(Command::PostureOn),
            b'D' => Ok(Command::PostureOff),
            b'C' => Ok(Command::Calibrate),
            b'0' => Ok(Command::Exit),
            other => Err(MonitorError::UnknownCommandByte(other)),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Command::PowerOn => b'1',
            Command::PowerOff => b'2',
            Command::PostureOn => b'P',
            Command::PostureOff => b'D',
            Command::Calibrate => b'C',
            Command::Exit => b'0',
        }
    }
}
