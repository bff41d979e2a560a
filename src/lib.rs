//! I2C sensor pool with auto-discovery and calibrated decoding
//!
//! This library reads raw register bytes from I2C-attached sensors and
//! converts them into calibrated physical readings. A bus scan
//! classifies responding addresses into known sensor types, builds a
//! driver per device, and groups the drivers by type for batched
//! reporting with per-device failure isolation.
//!
//! Supported devices: the AT30TSE75x temperature sensor, the
//! BME280/BMP280 barometric sensor (humidity on the BME280 only), and
//! the ADXL355 3-axis accelerometer.
//!
//! # Quick Start
//!
//! ## Discover and Read Everything
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use i2c_sensor_pool::{LinuxBus, SensorPool, SharedBus};
//!
//! let bus: SharedBus = Rc::new(RefCell::new(LinuxBus::open("/dev/i2c-1")?));
//! let mut pool = SensorPool::discover(bus);
//! println!("{}", pool.config_summary());
//!
//! for outcome in pool.read_all(None) {
//!     match outcome.result {
//!         Ok(reading) => println!("{} @0x{:02X}: {}", outcome.group, outcome.address, reading),
//!         Err(e) => eprintln!("{} @0x{:02X}: {}", outcome.group, outcome.address, e),
//!     }
//! }
//! # Ok::<(), i2c_sensor_pool::SensorError>(())
//! ```
//!
//! ## Drive a Single Sensor
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use i2c_sensor_pool::{Adxl355, LinuxBus, Range, SharedBus};
//!
//! let bus: SharedBus = Rc::new(RefCell::new(LinuxBus::open("/dev/i2c-1")?));
//! let mut accel = Adxl355::new(bus, 0x53)?;
//!
//! let (x, y, z) = accel.acceleration()?;
//! println!("X:{x:.5} Y:{y:.5} Z:{z:.5}");
//!
//! // Scaling changes only on an explicit range switch.
//! accel.set_range(Range::G8)?;
//! # Ok::<(), i2c_sensor_pool::SensorError>(())
//! ```
//!
//! ## Periodic Reporting
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::{Duration, Instant};
//!
//! use i2c_sensor_pool::{LinuxBus, Scheduler, SensorPool, SharedBus};
//!
//! let bus: SharedBus = Rc::new(RefCell::new(LinuxBus::open("/dev/i2c-1")?));
//! let mut pool = SensorPool::discover(bus);
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.add("report", 1.0, |pool: &mut SensorPool| {
//!     for outcome in pool.read_all(None) {
//!         if let Ok(reading) = outcome.result {
//!             println!("{}: {}", outcome.group, reading);
//!         }
//!     }
//! })?;
//!
//! for _ in 0..60 {
//!     scheduler.run_pending(Instant::now(), &mut pool);
//!     std::thread::sleep(Duration::from_millis(20));
//! }
//! # Ok::<(), i2c_sensor_pool::SensorError>(())
//! ```

pub mod adxl355;
pub mod at30tse75x;
pub mod bme280;
pub mod bus;
pub mod command;
pub mod decode;
pub mod error;
pub mod pool;
pub mod scheduler;
pub mod sensor;

// Re-export public API
pub use adxl355::{Adxl355, Range};
pub use at30tse75x::At30tse75x;
pub use bme280::{Bme280, ChipVariant};
pub use bus::{Bus, LinuxBus, SharedBus};
pub use command::Command;
pub use error::{Result, SensorError};
pub use pool::{
    FaultIndicator, ReadOutcome, SensorPool, ACCELEROMETER_GROUP, BAROMETER_GROUP,
    TEMPERATURE_GROUP,
};
pub use scheduler::Scheduler;
pub use sensor::{Reading, Sensor};
