//! AT30TSE75x temperature sensor driver
//!
//! The AT30TSE75x combines a temperature sensor, a serial EEPROM, and a
//! write-protection block, each answering on its own I2C address; this
//! driver talks to the temperature subdevice. The low 3 bits of the
//! address are set by the A2..A0 strap pins.

use crate::bus::SharedBus;
use crate::decode;
use crate::error::Result;
use crate::sensor::{Reading, Sensor};

// Register addresses
const REG_TEMPERATURE: u8 = 0x00;
const REG_RESOLUTION: u8 = 0xAC;

// Value written to the resolution register to select 12-bit conversions
const RESOLUTION_12BIT: u8 = 0x80;

/// °C per LSB in 12-bit mode
const STEP_12BIT: f64 = 0.0625;

/// AT30TSE75x temperature sensor
pub struct At30tse75x {
    bus: SharedBus,
    address: u8,
}

impl At30tse75x {
    /// Create a driver for the device at `address` and configure 12-bit
    /// resolution.
    pub fn new(bus: SharedBus, address: u8) -> Result<Self> {
        bus.borrow_mut()
            .write(address, REG_RESOLUTION, RESOLUTION_12BIT)?;
        Ok(Self { bus, address })
    }

    /// Current temperature in °C with 0.0625° resolution.
    pub fn temperature(&mut self) -> Result<f64> {
        Ok(Self::decode(self.read_raw()?))
    }

    /// Fetch the 16-bit big-endian temperature register pair.
    fn read_raw(&mut self) -> Result<u16> {
        let data = self.bus.borrow_mut().read(self.address, REG_TEMPERATURE, 2)?;
        Ok(decode::be_uint(&data) as u16)
    }

    /// Decode a raw register value into signed °C.
    ///
    /// With the sign bit clear, the integer part is the high byte and
    /// the fraction is the upper nibble of the low byte. With it set,
    /// the full 16-bit value is negated via two's complement before the
    /// same extraction.
    fn decode(raw: u16) -> f64 {
        if raw & 0x8000 == 0 {
            f64::from(raw >> 8) + f64::from((raw & 0x00F0) >> 4) * STEP_12BIT
        } else {
            let magnitude = (!raw).wrapping_add(1);
            -f64::from(magnitude >> 8) - f64::from((magnitude & 0x00F0) >> 4) * STEP_12BIT
        }
    }
}

impl Sensor for At30tse75x {
    fn address(&self) -> u8 {
        self.address
    }

    fn read(&mut self) -> Result<Reading> {
        Ok(Reading::Temperature {
            celsius: self.temperature()?,
        })
    }

    fn describe(&mut self) -> Result<String> {
        // The low 3 bits are the strap-selected device number.
        Ok(format!("{} Add:{}", self.read()?, self.address & 0x07))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::bus::mock::MockBus;
    use crate::bus::SharedBus;

    const ADDRESS: u8 = 0x4A;

    fn sensor_with_raw(raw: u16) -> (Rc<RefCell<MockBus>>, At30tse75x) {
        let mut mock = MockBus::new();
        mock.load(ADDRESS, REG_TEMPERATURE, &raw.to_be_bytes());
        let bus = Rc::new(RefCell::new(mock));
        let shared: SharedBus = bus.clone();
        let sensor = At30tse75x::new(shared, ADDRESS).unwrap();
        (bus, sensor)
    }

    #[test]
    fn test_construction_selects_12bit_mode() {
        let (bus, _sensor) = sensor_with_raw(0x0000);
        assert_eq!(
            bus.borrow().writes,
            vec![(ADDRESS, REG_RESOLUTION, RESOLUTION_12BIT)]
        );
    }

    #[test]
    fn test_positive_decode() {
        let (_bus, mut sensor) = sensor_with_raw(0x1900);
        assert_eq!(sensor.temperature().unwrap(), 25.0);
    }

    #[test]
    fn test_fractional_decode() {
        let (_bus, mut sensor) = sensor_with_raw(0x1990);
        assert_eq!(sensor.temperature().unwrap(), 25.5625);
    }

    #[test]
    fn test_negative_decode() {
        let (_bus, mut sensor) = sensor_with_raw(0xE700);
        assert_eq!(sensor.temperature().unwrap(), -25.0);

        let (_bus, mut sensor) = sensor_with_raw(0xE670);
        assert_eq!(sensor.temperature().unwrap(), -25.5625);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let (bus, mut sensor) = sensor_with_raw(0x1900);
        let first = sensor.temperature().unwrap();
        let second = sensor.temperature().unwrap();
        assert_eq!(first, second);
        // No caching at this layer: each read is a fresh transaction.
        assert_eq!(bus.borrow().reads_at(ADDRESS, REG_TEMPERATURE), 2);
    }

    #[test]
    fn test_describe_includes_strap_bits() {
        let (_bus, mut sensor) = sensor_with_raw(0x1900);
        assert_eq!(sensor.describe().unwrap(), "T:25.0000 Add:2");
    }
}
