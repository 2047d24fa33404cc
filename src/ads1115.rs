//! ADS1115 16-bit ADC.
//!
//! The bench uses the converter in single-shot mode only: write a config
//! word starting a conversion, wait one conversion period, read the result.
//! Comparator support is not wired up on the board and not exposed here.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use strum_macros::EnumIter;

use crate::error::{Error, Result};

/// Factory-default I2C address (ADDR pin to GND).
pub const DEFAULT_ADDRESS: u8 = 0x48;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Register {
    /// __R__ - Last conversion result.
    Conversion = 0x00,
    /// __R/W__ - Operational status and input configuration.
    Config = 0x01,
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

/// OS bit: begin a single conversion.
const CONFIG_OS_START: u16 = 0x8000;
/// Single-shot (power-down) mode.
const CONFIG_MODE_SINGLE: u16 = 0x0100;
/// Comparator disabled.
const CONFIG_COMP_DISABLE: u16 = 0x0003;

const MUX_OFFSET: u16 = 12;
const PGA_OFFSET: u16 = 9;
const DR_OFFSET: u16 = 5;

/// Input multiplexer selection: four single-ended inputs and the four
/// differential pairs the device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum Input {
    DiffA0A1 = 0x00,
    DiffA0A3 = 0x01,
    DiffA1A3 = 0x02,
    DiffA2A3 = 0x03,
    A0 = 0x04,
    A1 = 0x05,
    A2 = 0x06,
    A3 = 0x07,
}

/// Programmable gain amplifier full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum Gain {
    /// +/-6.144 V
    TwoThirds = 0x00,
    /// +/-4.096 V
    X1 = 0x01,
    /// +/-2.048 V
    X2 = 0x02,
    /// +/-1.024 V
    X4 = 0x03,
    /// +/-0.512 V
    X8 = 0x04,
    /// +/-0.256 V
    X16 = 0x05,
}

impl Gain {
    /// Full-scale input range in volts.
    pub const fn full_scale_v(self) -> f32 {
        match self {
            Self::TwoThirds => 6.144,
            Self::X1 => 4.096,
            Self::X2 => 2.048,
            Self::X4 => 1.024,
            Self::X8 => 0.512,
            Self::X16 => 0.256,
        }
    }
}

/// Conversion data rate in samples per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum DataRate {
    Sps8 = 0x00,
    Sps16 = 0x01,
    Sps32 = 0x02,
    Sps64 = 0x03,
    Sps128 = 0x04,
    Sps250 = 0x05,
    Sps475 = 0x06,
    Sps860 = 0x07,
}

impl DataRate {
    pub const fn samples_per_second(self) -> u32 {
        match self {
            Self::Sps8 => 8,
            Self::Sps16 => 16,
            Self::Sps32 => 32,
            Self::Sps64 => 64,
            Self::Sps128 => 128,
            Self::Sps250 => 250,
            Self::Sps475 => 475,
            Self::Sps860 => 860,
        }
    }

    /// Worst-case duration of one conversion, with headroom.
    const fn conversion_delay_us(self) -> u32 {
        1_000_000 / self.samples_per_second() + 100
    }
}

/// ADS1115 ADC in single-shot mode.
pub struct Ads1115<I2C, D> {
    i2c: I2C,
    address: u8,
    delay: D,
}

impl<I2C, D> Ads1115<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, address, delay }
    }

    fn write_register(&mut self, register: Register, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[register.into(), hi, lo])
            .map_err(Error::Bus)
    }

    fn read_register(&mut self, register: Register) -> Result<i16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok(i16::from_be_bytes(buf))
    }

    /// Start a single conversion on `input` and return the signed result.
    ///
    /// Blocks for one conversion period of the chosen data rate.
    pub fn read_channel(
        &mut self,
        input: Input,
        gain: Gain,
        rate: DataRate,
    ) -> Result<i16, I2C::Error> {
        let config = CONFIG_OS_START
            | ((input as u16) << MUX_OFFSET)
            | ((gain as u16) << PGA_OFFSET)
            | CONFIG_MODE_SINGLE
            | ((rate as u16) << DR_OFFSET)
            | CONFIG_COMP_DISABLE;
        self.write_register(Register::Config, config)?;
        self.delay.delay_us(rate.conversion_delay_us());
        self.read_register(Register::Conversion)
    }

    /// Single conversion converted to volts at the gain's full scale.
    pub fn read_channel_v(
        &mut self,
        input: Input,
        gain: Gain,
        rate: DataRate,
    ) -> Result<f32, I2C::Error> {
        let raw = self.read_channel(input, gain, rate)?;
        Ok(f32::from(raw) * gain.full_scale_v() / 32767.0)
    }
}
