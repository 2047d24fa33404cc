//! INA219 current/voltage/power monitor.
//!
//! One monitor sits in series with each bench rail. All registers are
//! 16-bit big-endian; the measurement registers are two's-complement. The
//! current and power registers only carry meaningful values after the
//! calibration register has been programmed, which [`Ina219::calibrate`]
//! does from one of two fixed bench profiles.

use embedded_hal::i2c::I2c;
use strum_macros::EnumIter;
use tracing::debug;

use crate::error::{Error, Result};

/// Factory-default I2C address (A0/A1 low).
pub const DEFAULT_ADDRESS: u8 = 0x40;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Register {
    /// __R/W__ - Operating configuration and reset.
    Config = 0x00,
    /// __R__ - Shunt voltage, 10 uV/LSB.
    ShuntVoltage = 0x01,
    /// __R__ - Bus voltage plus conversion-ready/overflow flags.
    BusVoltage = 0x02,
    /// __R__ - Calibrated power reading.
    Power = 0x03,
    /// __R__ - Calibrated current reading.
    Current = 0x04,
    /// __R/W__ - Calibration value scaling current/power readings.
    Calibration = 0x05,
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

/// RST bit in the configuration register.
const CONFIG_RESET: u16 = 0x8000;

// Configuration field layout.
const BRNG_OFFSET: u16 = 13;
const BRNG_KEEP_MASK: u16 = 0xDFFF;
const PG_OFFSET: u16 = 11;
const PG_KEEP_MASK: u16 = 0xE7FF;
const BADC_OFFSET: u16 = 7;
const BADC_KEEP_MASK: u16 = 0xF87F;
const SADC_OFFSET: u16 = 3;
const SADC_KEEP_MASK: u16 = 0xFF87;
const MODE_KEEP_MASK: u16 = 0xFFF8;

/// Bus full-scale range (BRNG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum BusVoltageRange {
    V16 = 0x00,
    V32 = 0x01,
}

/// Shunt-voltage PGA gain and range (PG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum Gain {
    Mv40 = 0x00,
    Mv80 = 0x01,
    Mv160 = 0x02,
    Mv320 = 0x03,
}

/// ADC conversion resolution (BADC/SADC, averaging disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum AdcResolution {
    Bits9 = 0x00,
    Bits10 = 0x01,
    Bits11 = 0x02,
    Bits12 = 0x03,
}

/// ADC sample averaging (BADC/SADC, always at 12-bit resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum AdcAveraging {
    Samples1 = 0x00,
    Samples2 = 0x01,
    Samples4 = 0x02,
    Samples8 = 0x03,
    Samples16 = 0x04,
    Samples32 = 0x05,
    Samples64 = 0x06,
    Samples128 = 0x07,
}

/// Operating mode (MODE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum Mode {
    PowerDown = 0x00,
    ShuntTriggered = 0x01,
    BusTriggered = 0x02,
    ShuntBusTriggered = 0x03,
    AdcOff = 0x04,
    ShuntContinuous = 0x05,
    BusContinuous = 0x06,
    ShuntBusContinuous = 0x07,
}

/// Encode the 4-bit ADC field: plain resolution codes below 12 bit,
/// averaging codes (bit 3 set) otherwise.
const fn adc_field(resolution: AdcResolution, averaging: AdcAveraging) -> u16 {
    match averaging {
        AdcAveraging::Samples1 => resolution as u16,
        _ => 0x08 | averaging as u16,
    }
}

/// Fixed calibration presets for the bench rails.
///
/// Each preset pins the current/power LSB weights and the raw calibration
/// value (`trunc(0.04096 / (current_lsb * r_shunt))` for the 0.1 ohm
/// bench shunt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum CalibrationProfile {
    /// 16 V bus, 400 mA full scale; 50 uA/bit, 1 mW/bit.
    LowCurrent,
    /// 16 V bus, 5 A full scale; 152.4 uA/bit, 3.048 mW/bit.
    HighCurrent,
}

impl CalibrationProfile {
    pub const fn current_lsb_ma(self) -> f32 {
        match self {
            Self::LowCurrent => 0.05,
            Self::HighCurrent => 0.1524,
        }
    }

    pub const fn power_lsb_w(self) -> f32 {
        match self {
            Self::LowCurrent => 0.001,
            Self::HighCurrent => 0.003048,
        }
    }

    pub const fn calibration_value(self) -> u16 {
        match self {
            Self::LowCurrent => 8192,
            Self::HighCurrent => 13434,
        }
    }

    /// The 400 mA profile reads the shunt at the smallest range for
    /// resolution; the 5 A profile needs the full +/-320 mV span.
    const fn gain(self) -> Gain {
        match self {
            Self::LowCurrent => Gain::Mv40,
            Self::HighCurrent => Gain::Mv320,
        }
    }
}

/// INA219 wattmeter.
pub struct Ina219<I2C> {
    i2c: I2C,
    address: u8,
    profile: Option<CalibrationProfile>,
}

impl<I2C: I2c> Ina219<I2C> {
    /// Create a new driver. Current and power reads fail with
    /// [`Error::NotCalibrated`] until [`calibrate`](Self::calibrate) ran.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address, profile: None }
    }

    fn read_register(&mut self, register: Register) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Signed view of a measurement register (bit 15 is the sign).
    fn read_signed(&mut self, register: Register) -> Result<i16, I2C::Error> {
        Ok(self.read_register(register)? as i16)
    }

    fn write_register(&mut self, register: Register, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[register.into(), hi, lo])
            .map_err(Error::Bus)
    }

    fn update_config(&mut self, keep_mask: u16, field: u16) -> Result<(), I2C::Error> {
        let current = self.read_register(Register::Config)?;
        self.write_register(Register::Config, (current & keep_mask) | field)
    }

    /// Request a device reset. All registers return to their power-on
    /// values, so a new [`calibrate`](Self::calibrate) is required.
    pub fn reset(&mut self) -> Result<(), I2C::Error> {
        self.profile = None;
        self.write_register(Register::Config, CONFIG_RESET)
    }

    /// Program a calibration profile: the calibration register, then bus
    /// range, gain, both ADC channels and continuous shunt+bus sampling.
    ///
    /// Each of the writes is independently fallible; a failure part-way
    /// leaves the device half-configured, in which case the stored profile
    /// is not updated.
    pub fn calibrate(&mut self, profile: CalibrationProfile) -> Result<(), I2C::Error> {
        self.write_register(Register::Calibration, profile.calibration_value())?;
        self.set_bus_voltage_range(BusVoltageRange::V16)?;
        self.set_gain(profile.gain())?;
        self.set_bus_adc(AdcResolution::Bits12, AdcAveraging::Samples1)?;
        self.set_shunt_adc(AdcResolution::Bits12, AdcAveraging::Samples1)?;
        self.set_mode(Mode::ShuntBusContinuous)?;
        self.profile = Some(profile);
        debug!(address = self.address, ?profile, "wattmeter calibrated");
        Ok(())
    }

    /// The profile programmed by the last successful calibration.
    pub fn calibration_profile(&self) -> Option<CalibrationProfile> {
        self.profile
    }

    pub fn set_bus_voltage_range(&mut self, range: BusVoltageRange) -> Result<(), I2C::Error> {
        self.update_config(BRNG_KEEP_MASK, (range as u16) << BRNG_OFFSET)
    }

    pub fn set_gain(&mut self, gain: Gain) -> Result<(), I2C::Error> {
        self.update_config(PG_KEEP_MASK, (gain as u16) << PG_OFFSET)
    }

    pub fn set_bus_adc(
        &mut self,
        resolution: AdcResolution,
        averaging: AdcAveraging,
    ) -> Result<(), I2C::Error> {
        self.update_config(BADC_KEEP_MASK, adc_field(resolution, averaging) << BADC_OFFSET)
    }

    pub fn set_shunt_adc(
        &mut self,
        resolution: AdcResolution,
        averaging: AdcAveraging,
    ) -> Result<(), I2C::Error> {
        self.update_config(SADC_KEEP_MASK, adc_field(resolution, averaging) << SADC_OFFSET)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), I2C::Error> {
        self.update_config(MODE_KEEP_MASK, mode as u16)
    }

    /// Bus voltage in volts. The status LSB is discarded and the
    /// remainder weighs 1 mV/LSB, independent of any calibration profile.
    pub fn bus_voltage_v(&mut self) -> Result<f32, I2C::Error> {
        let raw = self.read_signed(Register::BusVoltage)?;
        Ok(f32::from(raw >> 1) * 0.001)
    }

    /// Shunt voltage drop in volts.
    pub fn shunt_voltage_v(&mut self) -> Result<f32, I2C::Error> {
        let raw = self.read_signed(Register::ShuntVoltage)?;
        Ok(f32::from(raw) * 0.001)
    }

    /// Rail current in milliamps, scaled by the calibration profile.
    pub fn current_ma(&mut self) -> Result<f32, I2C::Error> {
        let profile = self.profile.ok_or(Error::NotCalibrated)?;
        let raw = self.read_signed(Register::Current)?;
        Ok(f32::from(raw) * profile.current_lsb_ma())
    }

    /// Rail power in watts, scaled by the calibration profile.
    pub fn power_w(&mut self) -> Result<f32, I2C::Error> {
        let profile = self.profile.ok_or(Error::NotCalibrated)?;
        let raw = self.read_signed(Register::Power)?;
        Ok(f32::from(raw) * profile.power_lsb_w())
    }

    /// Rail power in milliwatts.
    pub fn power_mw(&mut self) -> Result<f32, I2C::Error> {
        Ok(self.power_w()? * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBus;

    /// Queue the config-register reads consumed by the five
    /// read-modify-write steps of `calibrate`.
    fn queue_calibration_reads(bus: &MockBus, config: u16) {
        for _ in 0..5 {
            bus.push_read(&config.to_be_bytes());
        }
    }

    fn calibrated(bus: &MockBus, profile: CalibrationProfile) -> Ina219<MockBus> {
        let mut ina = Ina219::new(bus.clone(), DEFAULT_ADDRESS);
        queue_calibration_reads(bus, 0x399F);
        ina.calibrate(profile).unwrap();
        bus.clear_writes();
        ina
    }

    #[test]
    fn calibrate_writes_profile_value_first() {
        let bus = MockBus::new();
        let mut ina = Ina219::new(bus.clone(), DEFAULT_ADDRESS);
        queue_calibration_reads(&bus, 0x0000);

        ina.calibrate(CalibrationProfile::LowCurrent).unwrap();

        let writes = bus.writes();
        // 8192 == 0x2000 into the calibration register.
        let first_payload = writes.iter().find(|(_, w)| w.len() == 3).unwrap();
        assert_eq!(first_payload.1, vec![0x05, 0x20, 0x00]);
        // Final write selects continuous shunt+bus mode (bits 2:0 == 0b111).
        let last_payload = writes.iter().rev().find(|(_, w)| w.len() == 3).unwrap();
        assert_eq!(last_payload.1[0], 0x00);
        assert_eq!(last_payload.1[2] & 0x07, 0x07);
        assert_eq!(ina.calibration_profile(), Some(CalibrationProfile::LowCurrent));
    }

    #[test]
    fn calibrate_selects_gain_per_profile() {
        let bus = MockBus::new();
        let mut ina = Ina219::new(bus.clone(), DEFAULT_ADDRESS);
        queue_calibration_reads(&bus, 0x0000);
        ina.calibrate(CalibrationProfile::HighCurrent).unwrap();

        // Gain write is the third register write: +/-320 mV is PG = 0b11.
        let payloads: Vec<_> = bus.writes().into_iter().filter(|(_, w)| w.len() == 3).collect();
        let gain_write = &payloads[2].1;
        assert_eq!(gain_write[0], 0x00);
        assert_eq!((u16::from_be_bytes([gain_write[1], gain_write[2]]) >> 11) & 0x03, 0x03);
    }

    #[test]
    fn current_scales_by_profile_lsb() {
        let bus = MockBus::new();
        let mut ina = calibrated(&bus, CalibrationProfile::LowCurrent);

        bus.push_read(&[0x00, 0x64]);
        assert!((ina.current_ma().unwrap() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn measurement_registers_sign_extend() {
        let bus = MockBus::new();
        let mut ina = calibrated(&bus, CalibrationProfile::LowCurrent);

        bus.push_read(&[0x80, 0x00]);
        assert!((ina.current_ma().unwrap() - -1638.4).abs() < 1e-2);

        bus.push_read(&[0xFF, 0xFF]);
        assert!((ina.shunt_voltage_v().unwrap() - -0.001).abs() < 1e-6);
    }

    #[test]
    fn bus_voltage_discards_status_bits_at_one_millivolt_per_lsb() {
        let bus = MockBus::new();
        let mut ina = Ina219::new(bus.clone(), DEFAULT_ADDRESS);

        // 0x1F40 >> 1 == 4000 -> 4.0 V; no calibration required.
        bus.push_read(&[0x1F, 0x40]);
        assert!((ina.bus_voltage_v().unwrap() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn current_and_power_require_calibration() {
        let bus = MockBus::new();
        let mut ina = Ina219::new(bus.clone(), DEFAULT_ADDRESS);

        assert_eq!(ina.current_ma(), Err(Error::NotCalibrated));
        assert_eq!(ina.power_w(), Err(Error::NotCalibrated));
        assert_eq!(ina.power_mw(), Err(Error::NotCalibrated));
        // No transaction may have reached the device.
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn power_scales_by_profile_lsb() {
        let bus = MockBus::new();
        let mut ina = calibrated(&bus, CalibrationProfile::HighCurrent);

        bus.push_read(&[0x03, 0xE8]);
        assert!((ina.power_w().unwrap() - 3.048).abs() < 1e-4);
        bus.push_read(&[0x03, 0xE8]);
        assert!((ina.power_mw().unwrap() - 3048.0).abs() < 1e-1);
    }

    #[test]
    fn failed_calibration_does_not_store_the_profile() {
        let bus = MockBus::new();
        let mut ina = Ina219::new(bus.clone(), DEFAULT_ADDRESS);
        bus.set_write_error(true);

        assert!(matches!(
            ina.calibrate(CalibrationProfile::LowCurrent),
            Err(Error::Bus(_))
        ));
        assert_eq!(ina.calibration_profile(), None);
    }

    #[test]
    fn adc_field_uses_averaging_encoding_only_when_averaging() {
        assert_eq!(adc_field(AdcResolution::Bits12, AdcAveraging::Samples1), 0x03);
        assert_eq!(adc_field(AdcResolution::Bits9, AdcAveraging::Samples1), 0x00);
        assert_eq!(adc_field(AdcResolution::Bits12, AdcAveraging::Samples128), 0x0F);
        assert_eq!(adc_field(AdcResolution::Bits12, AdcAveraging::Samples2), 0x09);
    }
}
