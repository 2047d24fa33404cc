//! LM75 temperature sensor.
//!
//! Four registers: the temperature reading plus a configuration byte and
//! the two setpoints (hysteresis, overtemperature shutdown) driving the OS
//! output. Temperature words are big-endian two's-complement with a weight
//! of 1/256 degC per count.

use embedded_hal::i2c::I2c;
use modular_bitfield::prelude::*;

use crate::error::{Error, Result};

/// Factory-default I2C address (all address pins low).
pub const DEFAULT_ADDRESS: u8 = 0x48;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Register {
    /// __R__ - Current temperature.
    Temperature = 0x00,
    /// __R/W__ - Configuration byte.
    Configuration = 0x01,
    /// __R/W__ - Hysteresis setpoint.
    Hysteresis = 0x02,
    /// __R/W__ - Overtemperature shutdown setpoint.
    OvertempShutdown = 0x03,
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

/// Consecutive out-of-limit readings before OS asserts.
#[derive(Specifier, Debug, Clone, Copy, PartialEq, Eq)]
#[bits = 2]
pub enum FaultQueue {
    One = 0x00,
    Two = 0x01,
    Four = 0x02,
    Six = 0x03,
}

/// Configuration register layout.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub shutdown: bool,
    /// Comparator (false) or interrupt (true) OS behaviour.
    pub interrupt_mode: bool,
    /// OS active level.
    pub os_polarity_high: bool,
    pub fault_queue: FaultQueue,
    #[skip]
    __: B3,
}

/// LM75 temperature sensor.
pub struct Lm75<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Lm75<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    fn read_temperature_register(&mut self, register: Register) -> Result<f32, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok(f32::from(i16::from_be_bytes(buf)) / 256.0)
    }

    fn write_temperature_register(
        &mut self,
        register: Register,
        celsius: f32,
    ) -> Result<(), I2C::Error> {
        let word = (celsius * 256.0) as i16;
        let [hi, lo] = word.to_be_bytes();
        self.i2c
            .write(self.address, &[register.into(), hi, lo])
            .map_err(Error::Bus)
    }

    /// Temperature in degrees Celsius.
    pub fn read_temperature(&mut self) -> Result<f32, I2C::Error> {
        self.read_temperature_register(Register::Temperature)
    }

    /// Hysteresis setpoint in degrees Celsius.
    pub fn read_hysteresis(&mut self) -> Result<f32, I2C::Error> {
        self.read_temperature_register(Register::Hysteresis)
    }

    /// Overtemperature shutdown setpoint in degrees Celsius.
    pub fn read_overtemp_shutdown(&mut self) -> Result<f32, I2C::Error> {
        self.read_temperature_register(Register::OvertempShutdown)
    }

    pub fn set_hysteresis(&mut self, celsius: f32) -> Result<(), I2C::Error> {
        self.write_temperature_register(Register::Hysteresis, celsius)
    }

    pub fn set_overtemp_shutdown(&mut self, celsius: f32) -> Result<(), I2C::Error> {
        self.write_temperature_register(Register::OvertempShutdown, celsius)
    }

    pub fn config(&mut self) -> Result<Config, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[Register::Configuration.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok(Config::from_bytes(buf))
    }

    pub fn set_config(&mut self, config: Config) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[Register::Configuration.into(), config.into_bytes()[0]])
            .map_err(Error::Bus)
    }
}
