//! 103JT-025 thermistor, read through a channel of the on-board ADS1115.
//!
//! 10 kOhm NTC in a balanced divider against the 5 V supply. The raw ADC
//! count is turned into a resistance and the beta equation gives the
//! temperature.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::ads1115::{Ads1115, DataRate, Gain, Input};
use crate::error::{Error, Result};

/// Beta constant of the 103JT over 25/85 degC.
const BETA: f32 = 3435.0;
/// Nominal resistance at 25 degC.
const R_ROOM_OHM: f32 = 10_000.0;
/// Fixed divider resistor on the board.
const R_BALANCE_OHM: f32 = 10_000.0;
const KELVIN_OFFSET: f32 = 273.15;
const T_ROOM_K: f32 = KELVIN_OFFSET + 25.0;

/// Full-scale correction: the ADC spans 4.096 V at gain 1 while the
/// divider runs from the Pi's 5 V pin, which actually sits around 5.22 V.
const MAX_COUNT_CORRECTED: f32 = 32767.0 * (5.22 / 4.096);

/// 103JT thermistor on one ADC input.
pub struct Jt103<I2C, D> {
    adc: Ads1115<I2C, D>,
    input: Input,
}

impl<I2C, D> Jt103<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(adc: Ads1115<I2C, D>, input: Input) -> Self {
        Self { adc, input }
    }

    /// Temperature in degrees Celsius.
    pub fn read_temperature(&mut self) -> Result<f32, I2C::Error> {
        let raw = self.adc.read_channel(self.input, Gain::X1, DataRate::Sps128)?;
        raw_to_celsius(raw)
    }
}

/// Beta-equation conversion from a raw divider reading.
///
/// Counts at or below zero mean the thermistor is missing or shorted;
/// those have no temperature.
pub fn raw_to_celsius<E>(raw: i16) -> Result<f32, E> {
    if raw <= 0 {
        return Err(Error::OutOfRange);
    }
    let r_thermistor = R_BALANCE_OHM / (MAX_COUNT_CORRECTED / f32::from(raw) - 1.0);
    let t_kelvin = (BETA * T_ROOM_K) / (BETA + T_ROOM_K * (r_thermistor / R_ROOM_OHM).ln());
    Ok(t_kelvin - KELVIN_OFFSET)
}
