//! Bus scan, sensor classification, and grouped read dispatch.
//!
//! The pool owns every driver it constructs. Discovery classifies each
//! responding address against a fixed table of disjoint address ranges
//! and groups the resulting drivers under their sensor-type display
//! name, in discovery order. Batched reads isolate per-device failures:
//! one faulty sensor raises the fault indicator and never blocks the
//! rest.

use std::ops::Range;
use std::thread;
use std::time::Duration;

use crate::adxl355::Adxl355;
use crate::at30tse75x::At30tse75x;
use crate::bme280::Bme280;
use crate::bus::SharedBus;
use crate::error::Result;
use crate::sensor::{Reading, Sensor};

/// Grouping key for AT30TSE75x drivers.
pub const TEMPERATURE_GROUP: &str = "Temperature (T:C)";
/// Grouping key for BME280/BMP280 drivers.
pub const BAROMETER_GROUP: &str = "Barometer (P:hPa, t:C, H:%rH)";
/// Grouping key for ADXL355 drivers.
pub const ACCELEROMETER_GROUP: &str = "Accelerometer (x, y, z)";

/// Pause between consecutive device transactions during a batched read.
const READ_SPACING: Duration = Duration::from_millis(100);

/// Classification table entry: one sensor type owning one address
/// range.
struct Descriptor {
    name: &'static str,
    addresses: Range<u8>,
    construct: fn(SharedBus, u8) -> Result<Box<dyn Sensor>>,
}

fn build_temperature(bus: SharedBus, address: u8) -> Result<Box<dyn Sensor>> {
    Ok(Box::new(At30tse75x::new(bus, address)?))
}

fn build_barometer(bus: SharedBus, address: u8) -> Result<Box<dyn Sensor>> {
    Ok(Box::new(Bme280::new(bus, address)?))
}

fn build_accelerometer(bus: SharedBus, address: u8) -> Result<Box<dyn Sensor>> {
    Ok(Box::new(Adxl355::new(bus, address)?))
}

// Scanned in order, first match wins; the ranges are disjoint. The
// accelerometer answers on two strap-selected addresses, so it appears
// as two singleton ranges sharing one display name.
const DESCRIPTORS: &[Descriptor] = &[
    Descriptor {
        name: TEMPERATURE_GROUP,
        addresses: 0x48..0x50,
        construct: build_temperature,
    },
    Descriptor {
        name: BAROMETER_GROUP,
        addresses: 0x76..0x78,
        construct: build_barometer,
    },
    Descriptor {
        name: ACCELEROMETER_GROUP,
        addresses: 0x1D..0x1E,
        construct: build_accelerometer,
    },
    Descriptor {
        name: ACCELEROMETER_GROUP,
        addresses: 0x53..0x54,
        construct: build_accelerometer,
    },
];

/// External fault signal raised when a pooled device fails.
pub trait FaultIndicator {
    /// A device transaction failed.
    fn raise(&mut self);
    /// Reporting finished; release the signal.
    fn clear(&mut self);
}

/// Outcome of one driver's read during a batched dispatch.
#[derive(Debug)]
pub struct ReadOutcome {
    /// Display name of the group the driver belongs to.
    pub group: &'static str,
    /// 7-bit address of the device.
    pub address: u8,
    /// The reading, or the per-device error.
    pub result: Result<Reading>,
}

/// Pool of sensor drivers discovered on one bus.
pub struct SensorPool {
    bus: SharedBus,
    addresses: Vec<u8>,
    groups: Vec<(&'static str, Vec<Box<dyn Sensor>>)>,
    indicator: Option<Box<dyn FaultIndicator>>,
    read_spacing: Duration,
}

impl SensorPool {
    /// Scan the bus and construct a driver for every classified
    /// address.
    pub fn discover(bus: SharedBus) -> Self {
        Self::discover_with(bus, None)
    }

    /// Like [`discover`](Self::discover), with a fault indicator to
    /// raise on per-device failures.
    pub fn discover_with(bus: SharedBus, indicator: Option<Box<dyn FaultIndicator>>) -> Self {
        let addresses = bus.borrow_mut().scan();
        let mut pool = Self {
            bus,
            addresses,
            groups: Vec::new(),
            indicator,
            read_spacing: READ_SPACING,
        };
        pool.populate();
        pool
    }

    fn populate(&mut self) {
        let addresses = self.addresses.clone();
        for address in addresses {
            let descriptor = match DESCRIPTORS.iter().find(|d| d.addresses.contains(&address)) {
                Some(descriptor) => descriptor,
                // Addresses outside every range are not sensors we know.
                None => continue,
            };
            match (descriptor.construct)(self.bus.clone(), address) {
                Ok(sensor) => self.group_mut(descriptor.name).push(sensor),
                Err(e) => {
                    eprintln!("skipping device at 0x{address:02X}: {e}");
                    if let Some(indicator) = self.indicator.as_mut() {
                        indicator.raise();
                    }
                }
            }
        }
    }

    fn group_mut(&mut self, name: &'static str) -> &mut Vec<Box<dyn Sensor>> {
        let position = match self.groups.iter().position(|(n, _)| *n == name) {
            Some(position) => position,
            None => {
                self.groups.push((name, Vec::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[position].1
    }

    /// Read every driver, optionally restricted to one group, in
    /// discovery order.
    ///
    /// A failing driver raises the fault indicator and is reported in
    /// its outcome; the remaining drivers still execute.
    pub fn read_all(&mut self, filter: Option<&str>) -> Vec<ReadOutcome> {
        let mut outcomes = Vec::new();
        for (name, sensors) in &mut self.groups {
            if filter.is_some_and(|key| *name != key) {
                continue;
            }
            for sensor in sensors.iter_mut() {
                if !self.read_spacing.is_zero() {
                    thread::sleep(self.read_spacing);
                }
                let result = sensor.read();
                if result.is_err() {
                    if let Some(indicator) = self.indicator.as_mut() {
                        indicator.raise();
                    }
                }
                outcomes.push(ReadOutcome {
                    group: *name,
                    address: sensor.address(),
                    result,
                });
            }
        }
        outcomes
    }

    /// Release the fault indicator after reporting.
    pub fn clear_fault(&mut self) {
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.clear();
        }
    }

    /// Drivers in the named group, or every driver in discovery order.
    pub fn sensors(&mut self, name: Option<&str>) -> Vec<&mut (dyn Sensor + '_)> {
        let mut out: Vec<&mut (dyn Sensor + '_)> = Vec::new();
        for (n, sensors) in self.groups.iter_mut() {
            if name.map_or(true, |key| *n == key) {
                for s in sensors.iter_mut() {
                    out.push(s.as_mut());
                }
            }
        }
        out
    }

    /// Group display names in discovery order.
    pub fn group_names(&self) -> Vec<&'static str> {
        self.groups.iter().map(|(name, _)| *name).collect()
    }

    /// Number of drivers in the pool.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, sensors)| sensors.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Override the pause between device transactions in `read_all`.
    pub fn set_read_spacing(&mut self, spacing: Duration) {
        self.read_spacing = spacing;
    }

    /// Discovery summary: bus description and responding addresses.
    pub fn config_summary(&self) -> String {
        let addresses: Vec<String> = self
            .addresses
            .iter()
            .map(|a| format!("0x{a:02X}"))
            .collect();
        format!(
            "{}\naddresses: {}",
            self.bus.borrow().describe(),
            if addresses.is_empty() {
                "none".to_string()
            } else {
                addresses.join(", ")
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::bus::mock::MockBus;

    const TEMP_ADDRESS: u8 = 0x4A;
    const BARO_ADDRESS: u8 = 0x76;
    const ACCEL_ADDRESS: u8 = 0x53;

    fn add_temperature(mock: &mut MockBus, address: u8, raw: u16) {
        mock.load(address, 0x00, &raw.to_be_bytes());
    }

    fn add_barometer(mock: &mut MockBus, address: u8) {
        mock.load(address, 0xD0, &[0x60]); // BME280 id
        mock.load(
            address,
            0x88,
            &[
                0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27,
                0x0B, 0x8C, 0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17,
            ],
        );
        mock.load(address, 0xA1, &[0x4B]);
        mock.load(address, 0xE1, &[0x63, 0x01, 0x00, 0x14, 0x2D, 0x03, 0x1E]);
        mock.load(
            address,
            0xF7,
            &[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x61, 0xA8],
        );
    }

    fn add_accelerometer(mock: &mut MockBus, address: u8) {
        mock.add_device(address);
    }

    fn pool_from(mock: MockBus) -> (Rc<RefCell<MockBus>>, SensorPool) {
        let bus = Rc::new(RefCell::new(mock));
        let shared: SharedBus = bus.clone();
        let mut pool = SensorPool::discover(shared);
        pool.set_read_spacing(Duration::from_millis(0));
        (bus, pool)
    }

    struct CountingIndicator {
        raised: Rc<RefCell<usize>>,
        cleared: Rc<RefCell<usize>>,
    }

    impl FaultIndicator for CountingIndicator {
        fn raise(&mut self) {
            *self.raised.borrow_mut() += 1;
        }
        fn clear(&mut self) {
            *self.cleared.borrow_mut() += 1;
        }
    }

    #[test]
    fn test_discovery_classifies_by_address() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, TEMP_ADDRESS, 0x1900);
        add_barometer(&mut mock, BARO_ADDRESS);
        add_accelerometer(&mut mock, ACCEL_ADDRESS);
        let (_bus, mut pool) = pool_from(mock);

        assert_eq!(pool.len(), 3);
        assert_eq!(pool.sensors(Some(TEMPERATURE_GROUP)).len(), 1);
        assert_eq!(pool.sensors(Some(BAROMETER_GROUP)).len(), 1);
        assert_eq!(pool.sensors(Some(ACCELEROMETER_GROUP)).len(), 1);
        assert_eq!(
            pool.sensors(Some(TEMPERATURE_GROUP))[0].address(),
            TEMP_ADDRESS
        );
    }

    #[test]
    fn test_unclassified_addresses_are_excluded() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, TEMP_ADDRESS, 0x1900);
        mock.add_device(0x20); // in no descriptor range
        let (_bus, mut pool) = pool_from(mock);

        assert_eq!(pool.len(), 1);
        assert!(pool.sensors(None).iter().all(|s| s.address() != 0x20));
    }

    #[test]
    fn test_groups_preserve_discovery_order() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, 0x48, 0x1900);
        add_temperature(&mut mock, 0x4B, 0x1990);
        add_barometer(&mut mock, BARO_ADDRESS);
        let (_bus, mut pool) = pool_from(mock);

        assert_eq!(pool.group_names(), vec![TEMPERATURE_GROUP, BAROMETER_GROUP]);
        let addresses: Vec<u8> = pool
            .sensors(Some(TEMPERATURE_GROUP))
            .iter()
            .map(|s| s.address())
            .collect();
        assert_eq!(addresses, vec![0x48, 0x4B]);
    }

    #[test]
    fn test_read_all_with_filter() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, TEMP_ADDRESS, 0x1900);
        add_barometer(&mut mock, BARO_ADDRESS);
        let (_bus, mut pool) = pool_from(mock);

        let outcomes = pool.read_all(Some(TEMPERATURE_GROUP));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].group, TEMPERATURE_GROUP);
        assert_eq!(
            outcomes[0].result.as_ref().unwrap(),
            &Reading::Temperature { celsius: 25.0 }
        );
    }

    #[test]
    fn test_read_failure_is_isolated() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, 0x48, 0x1900);
        add_temperature(&mut mock, 0x49, 0x1990);
        add_barometer(&mut mock, BARO_ADDRESS);
        let raised = Rc::new(RefCell::new(0));
        let cleared = Rc::new(RefCell::new(0));

        let bus = Rc::new(RefCell::new(mock));
        let shared: SharedBus = bus.clone();
        let mut pool = SensorPool::discover_with(
            shared,
            Some(Box::new(CountingIndicator {
                raised: raised.clone(),
                cleared: cleared.clone(),
            })),
        );
        pool.set_read_spacing(Duration::from_millis(0));
        assert_eq!(pool.len(), 3);

        // First temperature device starts failing after discovery.
        bus.borrow_mut().fail(0x48);

        let outcomes = pool.read_all(None);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
        assert!(outcomes[2].result.is_ok());
        assert_eq!(*raised.borrow(), 1);

        pool.clear_fault();
        assert_eq!(*cleared.borrow(), 1);
    }

    #[test]
    fn test_failed_construction_skips_device() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, TEMP_ADDRESS, 0x1900);
        mock.load(BARO_ADDRESS, 0xD0, &[0x42]); // unknown chip id
        let (_bus, mut pool) = pool_from(mock);

        assert_eq!(pool.len(), 1);
        assert!(pool.sensors(Some(BAROMETER_GROUP)).is_empty());
    }

    #[test]
    fn test_config_summary_lists_addresses() {
        let mut mock = MockBus::new();
        add_temperature(&mut mock, TEMP_ADDRESS, 0x1900);
        let (_bus, pool) = pool_from(mock);
        let summary = pool.config_summary();
        assert!(summary.contains("mock I2C bus"));
        assert!(summary.contains("0x4A"));
    }
}
