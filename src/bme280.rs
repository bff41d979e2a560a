//! BME280/BMP280 barometric sensor driver
//!
//! One driver serves both chips: the identifier register distinguishes
//! the pressure+temperature BMP280 from the BME280, which adds
//! humidity. Compensation follows the Bosch datasheet formulas over the
//! factory-trimmed coefficients loaded at construction.
//!
//! Sampling is staleness-gated: a forced measurement is only triggered
//! when the cached sample is older than the configured window, so
//! callers polling faster than the window observe the identical sample
//! without extra bus traffic.

use std::thread;
use std::time::{Duration, Instant};

use crate::bus::SharedBus;
use crate::decode;
use crate::error::{Result, SensorError};
use crate::sensor::{Reading, Sensor};

// Register addresses
const REG_CALIBRATION: u8 = 0x88; // 24-byte T1..P9 block
const REG_DIG_H1: u8 = 0xA1;
const REG_ID: u8 = 0xD0;
const REG_DIG_H2: u8 = 0xE1; // 7-byte H2..H6 block
const REG_HUMIDITY_CONTROL: u8 = 0xF2;
const REG_CONTROL: u8 = 0xF4;
const REG_DATA: u8 = 0xF7;

// Chip identifiers
const CHIP_ID_BMP280: u8 = 0x58; // pressure + temperature
const CHIP_ID_BME280: u8 = 0x60; // pressure + temperature + humidity

// Oversampling codes
const OS_2: u8 = 2;
const OS_16: u8 = 5;
const OS_MAX: u8 = 5;

// Measurement-control register layout: osrs_t[7:5] osrs_p[4:2] mode[1:0]
const MODE_FORCED: u8 = 0b01;

/// Minimum age before the cached sample is refreshed.
const DEFAULT_STALENESS: Duration = Duration::from_millis(200);
/// Conversion time allowed after triggering a forced measurement.
const MEASURE_DELAY: Duration = Duration::from_millis(100);

/// Chip variant reported by the identifier register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVariant {
    /// Pressure and temperature only
    Bmp280,
    /// Pressure, temperature, and humidity
    Bme280,
}

/// Factory-trimmed compensation coefficients, loaded once at
/// construction. Humidity coefficients stay zero on a BMP280.
#[derive(Debug, Default, Clone, Copy)]
struct Calibration {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
    h1: u8,
    h2: i16,
    h3: u8,
    h4: i16,
    h5: i16,
    h6: i8,
}

impl Calibration {
    fn load(bus: &SharedBus, address: u8, variant: ChipVariant) -> Result<Self> {
        let mut bus = bus.borrow_mut();
        let pt = bus.read(address, REG_CALIBRATION, 24)?;
        let mut cal = Calibration {
            t1: decode::le_u16(pt[0], pt[1]),
            t2: decode::le_i16(pt[2], pt[3]),
            t3: decode::le_i16(pt[4], pt[5]),
            p1: decode::le_u16(pt[6], pt[7]),
            p2: decode::le_i16(pt[8], pt[9]),
            p3: decode::le_i16(pt[10], pt[11]),
            p4: decode::le_i16(pt[12], pt[13]),
            p5: decode::le_i16(pt[14], pt[15]),
            p6: decode::le_i16(pt[16], pt[17]),
            p7: decode::le_i16(pt[18], pt[19]),
            p8: decode::le_i16(pt[20], pt[21]),
            p9: decode::le_i16(pt[22], pt[23]),
            ..Calibration::default()
        };

        if variant == ChipVariant::Bme280 {
            cal.h1 = bus.read(address, REG_DIG_H1, 1)?[0];
            let hb = bus.read(address, REG_DIG_H2, 7)?;
            cal.h2 = decode::le_i16(hb[0], hb[1]);
            cal.h3 = hb[2];
            // h4 and h5 are 12-bit two's-complement values packed
            // across three registers; 0xE5 carries the low nibble of h4
            // and the low nibble of h5.
            cal.h4 = (i16::from(decode::i8_from(hb[3])) << 4) | i16::from(hb[4] & 0x0F);
            cal.h5 = (i16::from(decode::i8_from(hb[5])) << 4) | i16::from(hb[4] >> 4);
            cal.h6 = decode::i8_from(hb[6]);
        }

        Ok(cal)
    }
}

/// Raw values from the last fetch plus the compensation results
/// memoized against them. A new fetch replaces the whole sample.
#[derive(Debug, Default, Clone, Copy)]
struct Sample {
    p_raw: u32,
    t_raw: u32,
    h_raw: u32,
    t_fine: Option<i32>,
    temperature: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
}

/// BME280/BMP280 barometric sensor
pub struct Bme280 {
    bus: SharedBus,
    address: u8,
    variant: ChipVariant,
    calibration: Calibration,
    oversampling_t: u8,
    oversampling_p: u8,
    oversampling_h: u8,
    staleness: Duration,
    last_fetch: Option<Instant>,
    sample: Sample,
    humidity_notice_shown: bool,
}

impl std::fmt::Debug for Bme280 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bme280")
            .field("address", &self.address)
            .field("variant", &self.variant)
            .field("calibration", &self.calibration)
            .field("oversampling_t", &self.oversampling_t)
            .field("oversampling_p", &self.oversampling_p)
            .field("oversampling_h", &self.oversampling_h)
            .field("staleness", &self.staleness)
            .field("last_fetch", &self.last_fetch)
            .field("sample", &self.sample)
            .field("humidity_notice_shown", &self.humidity_notice_shown)
            .finish()
    }
}

impl Bme280 {
    /// Create a driver for the device at `address`.
    ///
    /// Reads the identifier register to pick the chip variant and loads
    /// the calibration coefficients. An identifier matching neither
    /// chip is an error.
    pub fn new(bus: SharedBus, address: u8) -> Result<Self> {
        let id = bus.borrow_mut().read(address, REG_ID, 1)?[0];
        let variant = match id {
            CHIP_ID_BMP280 => ChipVariant::Bmp280,
            CHIP_ID_BME280 => ChipVariant::Bme280,
            other => return Err(SensorError::UnknownChipId(other)),
        };
        let calibration = Calibration::load(&bus, address, variant)?;

        Ok(Self {
            bus,
            address,
            variant,
            calibration,
            oversampling_t: OS_2,
            oversampling_p: OS_16,
            oversampling_h: OS_2,
            staleness: DEFAULT_STALENESS,
            last_fetch: None,
            sample: Sample::default(),
            humidity_notice_shown: false,
        })
    }

    /// Chip variant detected at construction.
    pub fn variant(&self) -> ChipVariant {
        self.variant
    }

    /// Whether the detected chip measures humidity.
    pub fn supports_humidity(&self) -> bool {
        self.variant == ChipVariant::Bme280
    }

    /// Override the staleness window gating sample refreshes.
    pub fn set_staleness(&mut self, window: Duration) {
        self.staleness = window;
    }

    /// Override the oversampling codes (0..=5 each, datasheet
    /// encoding).
    pub fn set_oversampling(&mut self, t: u8, p: u8, h: u8) -> Result<()> {
        for (name, code) in [("temperature", t), ("pressure", p), ("humidity", h)] {
            if code > OS_MAX {
                return Err(SensorError::InvalidParameter(format!(
                    "{name} oversampling code must be 0-{OS_MAX}, got {code}"
                )));
            }
        }
        self.oversampling_t = t;
        self.oversampling_p = p;
        self.oversampling_h = h;
        Ok(())
    }

    /// Trigger a forced measurement and cache the raw sample, unless
    /// the cached one is still inside the staleness window.
    fn gauge(&mut self) -> Result<()> {
        let now = Instant::now();
        if let Some(last) = self.last_fetch {
            if now.duration_since(last) <= self.staleness {
                return Ok(());
            }
        }
        self.last_fetch = Some(now);

        if self.variant == ChipVariant::Bme280 {
            self.write_register(REG_HUMIDITY_CONTROL, self.oversampling_h)?;
        }
        let control = (self.oversampling_t << 5) | (self.oversampling_p << 2) | MODE_FORCED;
        self.write_register(REG_CONTROL, control)?;

        thread::sleep(MEASURE_DELAY);

        let length = if self.variant == ChipVariant::Bme280 { 8 } else { 6 };
        let d = self.bus.borrow_mut().read(self.address, REG_DATA, length)?;

        let mut sample = Sample {
            p_raw: (u32::from(d[0]) << 12) | (u32::from(d[1]) << 4) | (u32::from(d[2]) >> 4),
            t_raw: (u32::from(d[3]) << 12) | (u32::from(d[4]) << 4) | (u32::from(d[5]) >> 4),
            ..Sample::default()
        };
        if length == 8 {
            sample.h_raw = (u32::from(d[6]) << 8) | u32::from(d[7]);
        }
        // Replacing the sample drops every memoized compensation value.
        self.sample = sample;
        Ok(())
    }

    /// Fine temperature shared by all three compensations, computed
    /// once per sample.
    fn t_fine(&mut self) -> Result<i32> {
        self.gauge()?;
        if let Some(t_fine) = self.sample.t_fine {
            return Ok(t_fine);
        }
        let adc_t = self.sample.t_raw as i32;
        let t1 = i32::from(self.calibration.t1);
        let t2 = i32::from(self.calibration.t2);
        let t3 = i32::from(self.calibration.t3);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
        let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3) >> 14;
        let t_fine = var1 + var2;
        self.sample.t_fine = Some(t_fine);
        Ok(t_fine)
    }

    /// Temperature in °C.
    pub fn temperature(&mut self) -> Result<f64> {
        let t_fine = self.t_fine()?;
        if let Some(t) = self.sample.temperature {
            return Ok(t);
        }
        let t = f64::from((t_fine * 5 + 128) >> 8) / 100.0;
        self.sample.temperature = Some(t);
        Ok(t)
    }

    /// Pressure in Pa.
    ///
    /// Datasheet 64-bit integer compensation producing hundredths of Pa
    /// in Q24.8. A degenerate zero denominator yields a defined zero
    /// pressure.
    pub fn pressure(&mut self) -> Result<f64> {
        let t_fine = i64::from(self.t_fine()?);
        if let Some(p) = self.sample.pressure {
            return Ok(p);
        }
        let c = self.calibration;
        let (p1, p2, p3) = (i64::from(c.p1), i64::from(c.p2), i64::from(c.p3));
        let (p4, p5, p6) = (i64::from(c.p4), i64::from(c.p5), i64::from(c.p6));
        let (p7, p8, p9) = (i64::from(c.p7), i64::from(c.p8), i64::from(c.p9));

        let mut var1 = t_fine - 128_000;
        let mut var2 = var1 * var1 * p6;
        var2 += (var1 * p5) << 17;
        var2 += p4 << 35;
        var1 = ((var1 * var1 * p3) >> 8) + ((var1 * p2) << 12);
        var1 = (((1i64 << 47) + var1) * p1) >> 33;

        let pascal = if var1 == 0 {
            0.0
        } else {
            let mut p = 1_048_576 - i64::from(self.sample.p_raw);
            p = ((p << 31) - var2) * 3125 / var1;
            var1 = (p9 * ((p >> 13) * (p >> 13))) >> 25;
            var2 = (p8 * p) >> 19;
            p = ((p + var1 + var2) >> 8) + (p7 << 4);
            p as f64 / 256.0
        };
        self.sample.pressure = Some(pascal);
        Ok(pascal)
    }

    /// Relative humidity in %, clamped to 0..=100.
    ///
    /// Floating-point datasheet compensation. Errors with
    /// [`SensorError::UnsupportedCapability`] on a BMP280.
    pub fn humidity(&mut self) -> Result<f64> {
        if self.variant == ChipVariant::Bmp280 {
            return Err(SensorError::UnsupportedCapability {
                address: self.address,
            });
        }
        let t_fine = self.t_fine()?;
        if let Some(h) = self.sample.humidity {
            return Ok(h);
        }
        let c = self.calibration;
        let res = f64::from(t_fine) - 76_800.0;
        let res = (f64::from(self.sample.h_raw)
            - (f64::from(c.h4) * 64.0 + f64::from(c.h5) / 16_384.0 * res))
            * (f64::from(c.h2) / 65_536.0
                * (1.0
                    + f64::from(c.h6) / 67_108_864.0
                        * res
                        * (1.0 + f64::from(c.h3) / 67_108_864.0 * res)));
        let res = res * (1.0 - f64::from(c.h1) * res / 524_288.0);
        let h = res.clamp(0.0, 100.0);
        self.sample.humidity = Some(h);
        Ok(h)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.bus.borrow_mut().write(self.address, register, value)
    }
}

impl Sensor for Bme280 {
    fn address(&self) -> u8 {
        self.address
    }

    fn read(&mut self) -> Result<Reading> {
        let pressure_hpa = self.pressure()? / 100.0;
        let celsius = self.temperature()?;
        let humidity_pct = match self.humidity() {
            Ok(h) => h,
            Err(SensorError::UnsupportedCapability { address }) => {
                if !self.humidity_notice_shown {
                    eprintln!(
                        "device at 0x{address:02X} is a BMP280 without humidity, reporting 0"
                    );
                    self.humidity_notice_shown = true;
                }
                0.0
            }
            Err(e) => return Err(e),
        };
        Ok(Reading::Barometric {
            pressure_hpa,
            celsius,
            humidity_pct,
        })
    }
}
