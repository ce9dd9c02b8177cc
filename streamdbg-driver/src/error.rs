use std::{error::Error, fmt::Display};

/// Errors that may occur while bringing the debug IP up.
///
/// Bring-up is all-or-nothing: when any of these is returned, no channel
/// state has been initialized and the engine behaves as if `init` was never
/// called.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InitError {
    /// `set_design_info` was never called before `init`.
    MissingDesignInfo,
    /// The identity registers report a device this driver does not speak to.
    IncompatibleDevice { device_type: u32, version: u32 },
}

impl Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::MissingDesignInfo => {
                write!(f, "no design info was supplied before bring-up")
            }
            InitError::IncompatibleDevice {
                device_type,
                version,
            } => write!(
                f,
                "incompatible device: type 0x{:08X}, version 0x{:X}",
                device_type, version
            ),
        }
    }
}

impl Error for InitError {}
