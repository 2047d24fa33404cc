//! SHTC3 temperature and humidity sensor.
//!
//! The device speaks 16-bit commands instead of registers and protects
//! every data word with a CRC-8 (polynomial 0x31, init 0xFF). It sleeps
//! between measurements; [`Shtc3::wake`] must run before a measurement and
//! the bench leaves it awake afterwards unless told otherwise.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

/// Fixed I2C address, not configurable on this part.
pub const DEFAULT_ADDRESS: u8 = 0x70;

/// Time for one normal-mode measurement, with headroom.
const MEASUREMENT_DELAY_MS: u32 = 50;
/// Wake-up time after the wake command.
const WAKEUP_DELAY_MS: u32 = 1;

/// CRC-8 polynomial from the datasheet: x^8 + x^5 + x^4 + 1.
const CRC_POLYNOMIAL: u8 = 0x31;

#[derive(Debug, Copy, Clone)]
#[repr(u16)]
enum Command {
    WakeUp = 0x3517,
    Sleep = 0xB098,
    SoftReset = 0x805D,
    ReadId = 0xEFC8,
    /// Measure temperature first, normal mode, polling readout.
    MeasureNormal = 0x7866,
    /// Measure temperature first, low-power mode, polling readout.
    MeasureLowPower = 0x609C,
}

/// One combined reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_c: f32,
    pub humidity_rh: f32,
}

/// SHTC3 temperature/humidity sensor.
pub struct Shtc3<I2C, D> {
    i2c: I2C,
    address: u8,
    delay: D,
}

impl<I2C, D> Shtc3<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, address: DEFAULT_ADDRESS, delay }
    }

    fn command(&mut self, command: Command) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &(command as u16).to_be_bytes())
            .map_err(Error::Bus)
    }

    /// Wake the sensor from sleep.
    pub fn wake(&mut self) -> Result<(), I2C::Error> {
        self.command(Command::WakeUp)?;
        self.delay.delay_ms(WAKEUP_DELAY_MS);
        Ok(())
    }

    /// Put the sensor to sleep until the next [`wake`](Self::wake).
    pub fn sleep(&mut self) -> Result<(), I2C::Error> {
        self.command(Command::Sleep)
    }

    /// Soft-reset the sensor. It wakes up in sleep mode.
    pub fn soft_reset(&mut self) -> Result<(), I2C::Error> {
        self.command(Command::SoftReset)
    }

    /// Read the device identification word.
    pub fn read_id(&mut self) -> Result<u16, I2C::Error> {
        self.command(Command::ReadId)?;
        let mut buf = [0u8; 3];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        checked_word(&buf)
    }

    /// Run one measurement and return both compensated values.
    ///
    /// Low-power mode trades resolution for a much shorter conversion;
    /// the bench mostly runs normal mode.
    pub fn measure(&mut self, low_power: bool) -> Result<Measurement, I2C::Error> {
        let command = if low_power {
            Command::MeasureLowPower
        } else {
            Command::MeasureNormal
        };
        self.command(command)?;
        self.delay.delay_ms(MEASUREMENT_DELAY_MS);

        // Temperature word, CRC, humidity word, CRC.
        let mut buf = [0u8; 6];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        let temperature_raw = checked_word(&buf[0..3])?;
        let humidity_raw = checked_word(&buf[3..6])?;

        Ok(Measurement {
            temperature_c: raw_to_celsius(temperature_raw),
            humidity_rh: raw_to_humidity(humidity_raw),
        })
    }

    /// Temperature in degrees Celsius from one normal-mode measurement.
    pub fn read_temperature(&mut self) -> Result<f32, I2C::Error> {
        Ok(self.measure(false)?.temperature_c)
    }

    /// Relative humidity in percent from one normal-mode measurement.
    pub fn read_humidity(&mut self) -> Result<f32, I2C::Error> {
        Ok(self.measure(false)?.humidity_rh)
    }
}

/// T = -45 + 175 * raw / 2^16
fn raw_to_celsius(raw: u16) -> f32 {
    175.0 * (f32::from(raw) / 65536.0) - 45.0
}

/// RH = 100 * raw / 2^16
fn raw_to_humidity(raw: u16) -> f32 {
    100.0 * (f32::from(raw) / 65536.0)
}

/// Assemble a big-endian word from a `[msb, lsb, crc]` triple, verifying
/// the checksum.
fn checked_word<E, P>(chunk: &[u8]) -> core::result::Result<u16, Error<E, P>> {
    if crc8(&chunk[0..2]) != chunk[2] {
        return Err(Error::Crc);
    }
    Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
}

fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC_POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}
