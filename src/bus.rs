//! Register-level access to the shared I2C bus.
//!
//! Every driver in this crate talks to its device through the [`Bus`]
//! trait: register-indexed reads and writes plus a presence scan. The
//! production implementation ([`LinuxBus`]) sits on the Linux userspace
//! I2C interface; tests substitute a scripted in-memory bus.

use std::cell::RefCell;
use std::rc::Rc;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use crate::error::{Result, SensorError};

// 7-bit address window probed during a scan (0x00-0x02 and 0x78-0x7F
// are reserved by the I2C specification).
const SCAN_FIRST: u8 = 0x03;
const SCAN_LAST: u8 = 0x77;

/// Register-indexed transport over a single I2C bus.
///
/// Implementations issue one fresh transaction per call; nothing is
/// cached or retried at this layer. Failures carry the address,
/// register, and length of the attempted transaction.
pub trait Bus {
    /// Read `length` bytes starting at `register`. Reads past the first
    /// byte come from consecutive registers.
    ///
    /// A zero-length read returns an empty buffer without touching the
    /// bus.
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>>;

    /// Write a single byte to `register`.
    fn write(&mut self, address: u8, register: u8, value: u8) -> Result<()>;

    /// Responding 7-bit addresses, ascending.
    fn scan(&mut self) -> Vec<u8>;

    /// Human-readable description of the bus, for discovery summaries.
    fn describe(&self) -> String;
}

/// Shared handle to the single bus all drivers transact on.
///
/// The bus permits one outstanding transaction; single-threaded shared
/// ownership keeps every access strictly sequential.
pub type SharedBus = Rc<RefCell<dyn Bus>>;

/// [`Bus`] implementation over `/dev/i2c-*` via the `i2cdev` crate.
pub struct LinuxBus {
    device: LinuxI2CDevice,
    path: String,
}

impl LinuxBus {
    /// Open the bus device node, e.g. `/dev/i2c-1`.
    pub fn open(path: &str) -> Result<Self> {
        let device = LinuxI2CDevice::new(path, u16::from(SCAN_FIRST)).map_err(|e| {
            SensorError::Transport {
                address: 0,
                register: 0,
                length: 0,
                message: format!("failed to open {path}: {e}"),
            }
        })?;
        Ok(Self {
            device,
            path: path.to_string(),
        })
    }

    fn retarget(&mut self, address: u8, register: u8, length: usize) -> Result<()> {
        self.device
            .set_slave_address(u16::from(address))
            .map_err(|e| SensorError::Transport {
                address,
                register,
                length,
                message: e.to_string(),
            })
    }
}

impl Bus for LinuxBus {
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        self.retarget(address, register, length)?;

        let transport_err = |e: &dyn std::fmt::Display| SensorError::Transport {
            address,
            register,
            length,
            message: e.to_string(),
        };

        // Register pointer write followed by the data read.
        self.device
            .write(&[register])
            .map_err(|e| transport_err(&e))?;
        let mut data = vec![0u8; length];
        self.device
            .read(&mut data)
            .map_err(|e| transport_err(&e))?;
        Ok(data)
    }

    fn write(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        self.retarget(address, register, 1)?;
        self.device
            .smbus_write_byte_data(register, value)
            .map_err(|e| SensorError::Transport {
                address,
                register,
                length: 1,
                message: e.to_string(),
            })
    }

    fn scan(&mut self) -> Vec<u8> {
        let mut present = Vec::new();
        for address in SCAN_FIRST..=SCAN_LAST {
            if self.device.set_slave_address(u16::from(address)).is_err() {
                continue;
            }
            if self.device.smbus_read_byte().is_ok() {
                present.push(address);
            }
        }
        present
    }

    fn describe(&self) -> String {
        format!("Linux I2C bus {}", self.path)
    }
}
