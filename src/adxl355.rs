//! ADXL355 3-axis accelerometer driver
//!
//! Axis data is 20-bit two's complement spread across three registers
//! per axis. Output scaling depends on the configured measurement
//! range, so the g/LSB factor is owned by the driver and recomputed
//! only on an explicit range change.

use std::thread;
use std::time::Duration;

use crate::bus::SharedBus;
use crate::decode;
use crate::error::Result;
use crate::sensor::{Reading, Sensor};

// Register addresses
const REG_TEMP2: u8 = 0x06;
const REG_XDATA3: u8 = 0x08;
const REG_RANGE: u8 = 0x2C;
const REG_POWER_CTL: u8 = 0x2D;

// RANGE register: the low two bits select full scale
const RANGE_BITS_MASK: u8 = 0b0000_0011;
// POWER_CTL bit 0 puts the device in standby
const STANDBY_BIT: u8 = 0b0000_0001;

/// Output settle time after leaving standby.
const STARTUP_DELAY: Duration = Duration::from_millis(50);

// On-die temperature transfer, datasheet nominal values
const TEMP_BIAS: f64 = 1852.0;
const TEMP_SLOPE: f64 = -9.05;

/// Selectable measurement range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    /// ±2.048 g
    G2,
    /// ±4.096 g
    G4,
    /// ±8.192 g
    G8,
}

impl Range {
    fn bits(self) -> u8 {
        match self {
            Range::G2 => 0b01,
            Range::G4 => 0b10,
            Range::G8 => 0b11,
        }
    }

    fn fullscale(self) -> f64 {
        match self {
            Range::G2 => 2.048,
            Range::G4 => 4.096,
            Range::G8 => 8.192,
        }
    }

    /// g per LSB of the 20-bit output.
    fn factor(self) -> f64 {
        self.fullscale() * 2.0 / f64::from(1u32 << 20)
    }
}

/// ADXL355 accelerometer
pub struct Adxl355 {
    bus: SharedBus,
    address: u8,
    factor: f64,
    running: bool,
}

impl Adxl355 {
    /// Create a driver for the device at `address`, configure the ±2 g
    /// range, and start measurement.
    pub fn new(bus: SharedBus, address: u8) -> Result<Self> {
        let mut sensor = Self {
            bus,
            address,
            factor: Range::G2.factor(),
            running: false,
        };
        sensor.set_range(Range::G2)?;
        Ok(sensor)
    }

    /// Switch the measurement range.
    ///
    /// Stops the device, rewrites the range bits while preserving the
    /// rest of the register, restarts, and waits for the output to
    /// settle. This is the only operation that changes the scale
    /// factor.
    pub fn set_range(&mut self, range: Range) -> Result<()> {
        self.stop()?;
        let current = self.read_register(REG_RANGE)?;
        self.write_register(REG_RANGE, (current & !RANGE_BITS_MASK) | range.bits())?;
        self.factor = range.factor();
        self.start()?;
        thread::sleep(STARTUP_DELAY);
        Ok(())
    }

    /// Leave standby and resume measurement.
    pub fn start(&mut self) -> Result<()> {
        let ctl = self.read_register(REG_POWER_CTL)?;
        self.write_register(REG_POWER_CTL, ctl & !STANDBY_BIT)?;
        self.running = true;
        Ok(())
    }

    /// Enter standby.
    pub fn stop(&mut self) -> Result<()> {
        let ctl = self.read_register(REG_POWER_CTL)?;
        self.write_register(REG_POWER_CTL, ctl | STANDBY_BIT)?;
        self.running = false;
        Ok(())
    }

    /// Whether the device is measuring (not in standby).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Acceleration triple (x, y, z) in g.
    ///
    /// Reads all nine axis-data bytes in one transaction and assembles
    /// each axis as `high << 12 | mid << 4 | low >> 4` before
    /// sign-extending at bit 19.
    pub fn acceleration(&mut self) -> Result<(f64, f64, f64)> {
        let data = self.bus.borrow_mut().read(self.address, REG_XDATA3, 9)?;
        let mut axes = [0.0f64; 3];
        for (axis, chunk) in axes.iter_mut().zip(data.chunks_exact(3)) {
            let raw = (u32::from(chunk[0]) << 12)
                | (u32::from(chunk[1]) << 4)
                | (u32::from(chunk[2]) >> 4);
            *axis = f64::from(decode::sign_extend(raw, 20)) * self.factor;
        }
        Ok((axes[0], axes[1], axes[2]))
    }

    /// On-die temperature in °C from the 12-bit temperature registers.
    pub fn temperature(&mut self) -> Result<f64> {
        let data = self.bus.borrow_mut().read(self.address, REG_TEMP2, 2)?;
        let raw = (u32::from(data[0] & 0x0F) << 8) | u32::from(data[1]);
        Ok((f64::from(raw) - TEMP_BIAS) / TEMP_SLOPE + 25.0)
    }

    fn read_register(&mut self, register: u8) -> Result<u8> {
        let data = self.bus.borrow_mut().read(self.address, register, 1)?;
        Ok(data[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.bus.borrow_mut().write(self.address, register, value)
    }
}

impl Sensor for Adxl355 {
    fn address(&self) -> u8 {
        self.address
    }

    fn read(&mut self) -> Result<Reading> {
        let (x, y, z) = self.acceleration()?;
        Ok(Reading::Acceleration { x, y, z })
    }
}
