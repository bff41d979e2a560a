//! Error types for bus and sensor operations

use thiserror::Error;

/// Error type for bus and sensor operations
#[derive(Error, Debug)]
pub enum SensorError {
    /// Bus transaction failed
    #[error(
        "bus transaction failed at address 0x{address:02X}, register 0x{register:02X}, \
         length {length}: {message}"
    )]
    Transport {
        address: u8,
        register: u8,
        length: usize,
        message: String,
    },

    /// Chip identifier did not match any known variant
    #[error("unrecognized chip id 0x{0:02X}")]
    UnknownChipId(u8),

    /// Measurement requested that the detected chip cannot provide
    #[error("device at 0x{address:02X} cannot measure humidity")]
    UnsupportedCapability { address: u8 },

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for bus and sensor operations
pub type Result<T> = std::result::Result<T, SensorError>;
