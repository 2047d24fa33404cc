//! MIC24045 DC/DC buck converter.
//!
//! One converter powers one bench rail. The device is enabled through a
//! dedicated GPIO line, everything else goes over I2C: two packed settings
//! registers (current limit, switching frequency, start-up delay, voltage
//! margin, soft-start slope), an 8-bit output-voltage register, a status
//! register and a command register for clearing latched faults.
//!
//! The output-voltage register uses a piecewise-linear code, 5 mV steps at
//! the bottom and 50 mV steps at the top; see [`register_to_millivolts`]
//! and [`millivolts_to_register`] for the exact mapping.
//!
//! Note that the device only acknowledges I2C transfers while VIN is
//! present, and the status register's enable flag may read stale without
//! it. [`Mic24045::intended_enabled`] (the GPIO latch) is authoritative for
//! intent; [`Mic24045::observed_enabled`] is the device's confirmation.

use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use embedded_hal::i2c::I2c;
use modular_bitfield::prelude::*;
use strum_macros::EnumIter;
use tracing::debug;

use crate::error::{Error, Result, VoltageOutOfRange};

/// Factory-default I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x50;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Register {
    /// __R__ - Fault and power-good flags.
    Status = 0x00,
    /// __R/W__ - Current limit and switching frequency.
    Setting1 = 0x01,
    /// __R/W__ - Start-up delay, voltage margin and soft-start slope.
    Setting2 = 0x02,
    /// __R/W__ - Output-voltage code.
    Vout = 0x03,
    /// __R/W__ - Command bits (CIFF fault-flag clear).
    Command = 0x04,
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

/// CIFF bit in the command register; writing it clears the latched faults.
const CMD_CLEAR_FAULT_FLAGS: u8 = 0x01;

// SETTING1 field layout.
const ILIM_OFFSET: u8 = 6;
const ILIM_KEEP_MASK: u8 = 0x3F;
const FREQ_OFFSET: u8 = 3;
const FREQ_KEEP_MASK: u8 = 0xC7;

// SETTING2 field layout.
const SUD_OFFSET: u8 = 4;
const SUD_KEEP_MASK: u8 = 0x8F;
const MRG_OFFSET: u8 = 2;
const MRG_KEEP_MASK: u8 = 0xF3;
const SS_KEEP_MASK: u8 = 0xFC;

/// Status register flags.
///
/// Datasheet bit names: PGS (bit 0), EnS (bit 3), ThWrnF (bit 5),
/// ThSDF (bit 6), OCF (bit 7).
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct Status {
    pub power_good: bool,
    #[skip]
    __: B2,
    pub enabled: bool,
    #[skip]
    __: B1,
    pub thermal_warning: bool,
    pub thermal_shutdown: bool,
    pub overcurrent_fault: bool,
}

/// Output current limit (ILIM, SETTING1 bits 7:6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum CurrentLimit {
    A2 = 0x00,
    A3 = 0x01,
    A4 = 0x02,
    A5 = 0x03,
}

impl CurrentLimit {
    pub const fn amps(self) -> u8 {
        match self {
            Self::A2 => 2,
            Self::A3 => 3,
            Self::A4 => 4,
            Self::A5 => 5,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0x00 => Self::A2,
            0x01 => Self::A3,
            0x02 => Self::A4,
            _ => Self::A5,
        }
    }
}

/// Switching frequency (FREQ, SETTING1 bits 5:3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Frequency {
    Khz310 = 0x00,
    Khz400 = 0x01,
    Khz500 = 0x02,
    Khz570 = 0x03,
    Khz660 = 0x04,
    Khz780 = 0x05,
    Khz970 = 0x06,
    Khz1200 = 0x07,
}

impl Frequency {
    pub const fn kilohertz(self) -> u16 {
        match self {
            Self::Khz310 => 310,
            Self::Khz400 => 400,
            Self::Khz500 => 500,
            Self::Khz570 => 570,
            Self::Khz660 => 660,
            Self::Khz780 => 780,
            Self::Khz970 => 970,
            Self::Khz1200 => 1200,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0x00 => Self::Khz310,
            0x01 => Self::Khz400,
            0x02 => Self::Khz500,
            0x03 => Self::Khz570,
            0x04 => Self::Khz660,
            0x05 => Self::Khz780,
            0x06 => Self::Khz970,
            _ => Self::Khz1200,
        }
    }
}

/// Start-up delay (SUD, SETTING2 bits 6:4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum StartupDelay {
    Ms0 = 0x00,
    Ms0_5 = 0x01,
    Ms1 = 0x02,
    Ms2 = 0x03,
    Ms4 = 0x04,
    Ms6 = 0x05,
    Ms8 = 0x06,
    Ms10 = 0x07,
}

impl StartupDelay {
    pub const fn microseconds(self) -> u16 {
        match self {
            Self::Ms0 => 0,
            Self::Ms0_5 => 500,
            Self::Ms1 => 1_000,
            Self::Ms2 => 2_000,
            Self::Ms4 => 4_000,
            Self::Ms6 => 6_000,
            Self::Ms8 => 8_000,
            Self::Ms10 => 10_000,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0x00 => Self::Ms0,
            0x01 => Self::Ms0_5,
            0x02 => Self::Ms1,
            0x03 => Self::Ms2,
            0x04 => Self::Ms4,
            0x05 => Self::Ms6,
            0x06 => Self::Ms8,
            _ => Self::Ms10,
        }
    }
}

/// Output-voltage margin (MRG, SETTING2 bits 3:2). Code 0b11 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum VoltageMargin {
    Zero = 0x00,
    MinusFivePercent = 0x01,
    PlusFivePercent = 0x02,
}

impl VoltageMargin {
    pub const fn percent(self) -> i8 {
        match self {
            Self::Zero => 0,
            Self::MinusFivePercent => -5,
            Self::PlusFivePercent => 5,
        }
    }

    const fn from_code(code: u8) -> Option<Self> {
        match code & 0x03 {
            0x00 => Some(Self::Zero),
            0x01 => Some(Self::MinusFivePercent),
            0x02 => Some(Self::PlusFivePercent),
            _ => None,
        }
    }
}

/// Soft-start slope (SS, SETTING2 bits 1:0), in mV/ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum SoftStartSlope {
    Mv160PerMs = 0x00,
    Mv380PerMs = 0x01,
    Mv760PerMs = 0x02,
    Mv1500PerMs = 0x03,
}

impl SoftStartSlope {
    pub const fn millivolts_per_ms(self) -> u16 {
        match self {
            Self::Mv160PerMs => 160,
            Self::Mv380PerMs => 380,
            Self::Mv760PerMs => 760,
            Self::Mv1500PerMs => 1500,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0x00 => Self::Mv160PerMs,
            0x01 => Self::Mv380PerMs,
            0x02 => Self::Mv760PerMs,
            _ => Self::Mv1500PerMs,
        }
    }
}

/// Translate an output-voltage register code into millivolts.
///
/// The mapping is piecewise linear with four segments of increasing step
/// size; every 8-bit code has a defined voltage between 640 mV and 5250 mV.
pub const fn register_to_millivolts(code: u8) -> u32 {
    let code = code as u32;
    match code {
        0..=128 => 640 + 5 * code,
        129..=195 => 1290 + 10 * (code - 129),
        196..=244 => 1980 + 30 * (code - 196),
        _ => 4750 + 50 * (code - 245),
    }
}

/// Translate a voltage in millivolts into the register code that programs
/// the highest output not above it.
///
/// The three gaps between segments (the codes step 1280→1290, 1950→1980 and
/// 3420→4750 mV) resolve to the top code of the lower segment, so a request
/// inside a gap never truncates into a neighbouring segment. Requests below
/// 640 mV or above 5250 mV have no code.
pub const fn millivolts_to_register(mv: u32) -> core::result::Result<u8, VoltageOutOfRange> {
    let code = match mv {
        0..=639 => return Err(VoltageOutOfRange),
        640..=1279 => (mv - 640) / 5,
        1280..=1289 => 128,
        1290..=1949 => 129 + (mv - 1290) / 10,
        1950..=1979 => 195,
        1980..=3419 => 196 + (mv - 1980) / 30,
        3420..=4749 => 244,
        4750..=5250 => 245 + (mv - 4750) / 50,
        _ => return Err(VoltageOutOfRange),
    };
    Ok(code as u8)
}

/// [`register_to_millivolts`] in volts.
pub fn register_to_volts(code: u8) -> f32 {
    register_to_millivolts(code) as f32 / 1000.0
}

/// [`millivolts_to_register`] from volts. The request is rounded to the
/// nearest millivolt first; the register resolution is 5 mV at best.
pub fn volts_to_register(volts: f32) -> core::result::Result<u8, VoltageOutOfRange> {
    if !volts.is_finite() || volts < 0.0 {
        return Err(VoltageOutOfRange);
    }
    millivolts_to_register((volts * 1000.0).round() as u32)
}

/// MIC24045 DC/DC converter with its enable line.
pub struct Mic24045<I2C, EN> {
    i2c: I2C,
    address: u8,
    enable: EN,
}

impl<I2C, EN> Mic24045<I2C, EN>
where
    I2C: I2c,
    EN: OutputPin + StatefulOutputPin,
{
    /// Create a new driver. No bus or pin traffic happens until
    /// [`init`](Self::init) or one of the operations is called.
    pub fn new(i2c: I2C, enable: EN, address: u8) -> Self {
        Self { i2c, address, enable }
    }

    /// One-time bring-up: drive the enable line low, clear latched fault
    /// flags and program the bench defaults (3 A current limit, 500 kHz,
    /// no start-up delay, 0 % margin, slowest soft-start).
    ///
    /// The converter must be reachable on the bus (VIN present, mux channel
    /// selected) or the register writes fail.
    pub fn init(&mut self) -> Result<(), I2C::Error, EN::Error> {
        self.disable()?;
        self.clear_fault_flags()?;
        self.set_current_limit(CurrentLimit::A3)?;
        self.set_frequency(Frequency::Khz500)?;
        self.set_startup_delay(StartupDelay::Ms0)?;
        self.set_voltage_margin(VoltageMargin::Zero)?;
        self.set_soft_start_slope(SoftStartSlope::Mv160PerMs)?;
        debug!(address = self.address, "converter initialised");
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u8, I2C::Error, EN::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<(), I2C::Error, EN::Error> {
        self.i2c
            .write(self.address, &[register.into(), value])
            .map_err(Error::Bus)
    }

    /// Read-modify-write of one packed settings field.
    fn update_register(
        &mut self,
        register: Register,
        keep_mask: u8,
        field: u8,
    ) -> Result<(), I2C::Error, EN::Error> {
        let current = self.read_register(register)?;
        self.write_register(register, (current & keep_mask) | field)
    }

    /// Drive the enable line high. The device confirms via the status
    /// register once VIN is up; this call does not wait for that.
    pub fn enable(&mut self) -> Result<(), I2C::Error, EN::Error> {
        self.enable.set_high().map_err(Error::Pin)
    }

    /// Drive the enable line low.
    pub fn disable(&mut self) -> Result<(), I2C::Error, EN::Error> {
        self.enable.set_low().map_err(Error::Pin)
    }

    /// Whether the enable line is currently driven high.
    ///
    /// This reflects what the bench asked for. It can disagree with
    /// [`observed_enabled`](Self::observed_enabled) while VIN is absent.
    pub fn intended_enabled(&mut self) -> Result<bool, I2C::Error, EN::Error> {
        self.enable.is_set_high().map_err(Error::Pin)
    }

    /// Whether the device itself reports the EnS status flag.
    pub fn observed_enabled(&mut self) -> Result<bool, I2C::Error, EN::Error> {
        Ok(self.read_status()?.enabled())
    }

    /// Whether the device reports the output in regulation (PGS flag).
    pub fn is_power_good(&mut self) -> Result<bool, I2C::Error, EN::Error> {
        Ok(self.read_status()?.power_good())
    }

    /// Read the full status flag set.
    pub fn read_status(&mut self) -> Result<Status, I2C::Error, EN::Error> {
        Ok(Status::from_bytes([self.read_register(Register::Status)?]))
    }

    /// Clear the latched fault flags (OCF, ThSDF, ThWrnF).
    pub fn clear_fault_flags(&mut self) -> Result<(), I2C::Error, EN::Error> {
        self.write_register(Register::Command, CMD_CLEAR_FAULT_FLAGS)
    }

    pub fn set_current_limit(&mut self, limit: CurrentLimit) -> Result<(), I2C::Error, EN::Error> {
        self.update_register(Register::Setting1, ILIM_KEEP_MASK, (limit as u8) << ILIM_OFFSET)
    }

    pub fn current_limit(&mut self) -> Result<CurrentLimit, I2C::Error, EN::Error> {
        let reg = self.read_register(Register::Setting1)?;
        Ok(CurrentLimit::from_code(reg >> ILIM_OFFSET))
    }

    pub fn set_frequency(&mut self, frequency: Frequency) -> Result<(), I2C::Error, EN::Error> {
        self.update_register(Register::Setting1, FREQ_KEEP_MASK, (frequency as u8) << FREQ_OFFSET)
    }

    pub fn frequency(&mut self) -> Result<Frequency, I2C::Error, EN::Error> {
        let reg = self.read_register(Register::Setting1)?;
        Ok(Frequency::from_code(reg >> FREQ_OFFSET))
    }

    pub fn set_startup_delay(&mut self, delay: StartupDelay) -> Result<(), I2C::Error, EN::Error> {
        self.update_register(Register::Setting2, SUD_KEEP_MASK, (delay as u8) << SUD_OFFSET)
    }

    pub fn startup_delay(&mut self) -> Result<StartupDelay, I2C::Error, EN::Error> {
        let reg = self.read_register(Register::Setting2)?;
        Ok(StartupDelay::from_code(reg >> SUD_OFFSET))
    }

    pub fn set_voltage_margin(&mut self, margin: VoltageMargin) -> Result<(), I2C::Error, EN::Error> {
        self.update_register(Register::Setting2, MRG_KEEP_MASK, (margin as u8) << MRG_OFFSET)
    }

    /// Read back the programmed margin. The device can in principle hold
    /// the reserved code, which is reported as an invalid response.
    pub fn voltage_margin(&mut self) -> Result<VoltageMargin, I2C::Error, EN::Error> {
        let reg = self.read_register(Register::Setting2)?;
        VoltageMargin::from_code(reg >> MRG_OFFSET).ok_or(Error::InvalidResponse)
    }

    pub fn set_soft_start_slope(&mut self, slope: SoftStartSlope) -> Result<(), I2C::Error, EN::Error> {
        self.update_register(Register::Setting2, SS_KEEP_MASK, slope as u8)
    }

    pub fn soft_start_slope(&mut self) -> Result<SoftStartSlope, I2C::Error, EN::Error> {
        let reg = self.read_register(Register::Setting2)?;
        Ok(SoftStartSlope::from_code(reg))
    }

    /// Program the raw output-voltage code. Any 8-bit value is accepted;
    /// the resulting voltage follows [`register_to_millivolts`].
    pub fn set_output_voltage(&mut self, code: u8) -> Result<(), I2C::Error, EN::Error> {
        self.write_register(Register::Vout, code)
    }

    /// Program the output voltage in millivolts.
    pub fn set_output_voltage_mv(&mut self, mv: u32) -> Result<(), I2C::Error, EN::Error> {
        let code = millivolts_to_register(mv)?;
        self.set_output_voltage(code)
    }

    /// Current output-voltage register code.
    pub fn output_voltage_code(&mut self) -> Result<u8, I2C::Error, EN::Error> {
        self.read_register(Register::Vout)
    }

    /// Current output-voltage setpoint in millivolts.
    pub fn output_voltage_mv(&mut self) -> Result<u32, I2C::Error, EN::Error> {
        Ok(register_to_millivolts(self.output_voltage_code()?))
    }

    /// Current output-voltage setpoint in volts.
    pub fn output_voltage_v(&mut self) -> Result<f32, I2C::Error, EN::Error> {
        Ok(register_to_volts(self.output_voltage_code()?))
    }

    /// Step the output voltage up by one register code (5/10/30/50 mV
    /// depending on the segment). Fails at the top code instead of
    /// wrapping.
    pub fn increment_output_voltage(&mut self) -> Result<(), I2C::Error, EN::Error> {
        let code = self.output_voltage_code()?;
        if code == u8::MAX {
            return Err(Error::OutOfRange);
        }
        self.set_output_voltage(code + 1)
    }

    /// Step the output voltage down by one register code. Fails at the
    /// bottom code instead of wrapping.
    pub fn decrement_output_voltage(&mut self) -> Result<(), I2C::Error, EN::Error> {
        let code = self.output_voltage_code()?;
        if code == 0 {
            return Err(Error::OutOfRange);
        }
        self.set_output_voltage(code - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockPin};
    use strum::IntoEnumIterator;

    fn converter(bus: &MockBus, pin: &MockPin) -> Mic24045<MockBus, MockPin> {
        Mic24045::new(bus.clone(), pin.clone(), DEFAULT_ADDRESS)
    }

    #[test]
    fn register_code_maps_to_documented_boundary_voltages() {
        assert_eq!(register_to_millivolts(0), 640);
        assert_eq!(register_to_millivolts(128), 1280);
        assert_eq!(register_to_millivolts(129), 1290);
        assert_eq!(register_to_millivolts(195), 1950);
        assert_eq!(register_to_millivolts(196), 1980);
        assert_eq!(register_to_millivolts(244), 3420);
        assert_eq!(register_to_millivolts(245), 4750);
        assert_eq!(register_to_millivolts(255), 5250);
    }

    #[test]
    fn voltage_conversion_round_trips_every_code() {
        for code in 0..=u8::MAX {
            let mv = register_to_millivolts(code);
            assert_eq!(millivolts_to_register(mv), Ok(code), "code {code} ({mv} mV)");
        }
    }

    #[test]
    fn voltage_conversion_is_monotonic() {
        for code in 0..u8::MAX {
            assert!(register_to_millivolts(code) < register_to_millivolts(code + 1));
        }
    }

    #[test]
    fn segment_gaps_resolve_to_lower_segment_top_code() {
        // 5 mV / 10 mV gap
        assert_eq!(millivolts_to_register(1280), Ok(128));
        assert_eq!(millivolts_to_register(1285), Ok(128));
        assert_eq!(millivolts_to_register(1289), Ok(128));
        // 10 mV / 30 mV gap
        assert_eq!(millivolts_to_register(1950), Ok(195));
        assert_eq!(millivolts_to_register(1979), Ok(195));
        // 30 mV / 50 mV gap
        assert_eq!(millivolts_to_register(3421), Ok(244));
        assert_eq!(millivolts_to_register(4000), Ok(244));
        assert_eq!(millivolts_to_register(4749), Ok(244));
    }

    #[test]
    fn out_of_span_voltages_are_rejected() {
        assert_eq!(millivolts_to_register(0), Err(VoltageOutOfRange));
        assert_eq!(millivolts_to_register(639), Err(VoltageOutOfRange));
        assert_eq!(millivolts_to_register(5251), Err(VoltageOutOfRange));
        assert_eq!(volts_to_register(0.5), Err(VoltageOutOfRange));
        assert_eq!(volts_to_register(5.3), Err(VoltageOutOfRange));
        assert_eq!(volts_to_register(-1.0), Err(VoltageOutOfRange));
        assert_eq!(volts_to_register(f32::NAN), Err(VoltageOutOfRange));
    }

    #[test]
    fn volt_level_wrappers_round_to_millivolts() {
        assert_eq!(volts_to_register(0.64), Ok(0));
        assert_eq!(volts_to_register(1.28), Ok(128));
        assert_eq!(volts_to_register(1.29), Ok(129));
        assert_eq!(volts_to_register(3.3), Ok(240));
        assert_eq!(volts_to_register(5.25), Ok(255));
        assert!((register_to_volts(240) - 3.3).abs() < 1e-3);
    }

    #[test]
    fn status_flags_decode() {
        let status = Status::from_bytes([0x09]);
        assert!(status.power_good());
        assert!(status.enabled());
        assert!(!status.overcurrent_fault());
        assert!(!status.thermal_shutdown());

        let status = Status::from_bytes([0xC0]);
        assert!(status.overcurrent_fault());
        assert!(status.thermal_shutdown());
        assert!(!status.power_good());
    }

    #[test]
    fn field_codes_round_trip() {
        for limit in CurrentLimit::iter() {
            assert_eq!(CurrentLimit::from_code(limit as u8), limit);
        }
        for frequency in Frequency::iter() {
            assert_eq!(Frequency::from_code(frequency as u8), frequency);
        }
        for delay in StartupDelay::iter() {
            assert_eq!(StartupDelay::from_code(delay as u8), delay);
        }
        for margin in VoltageMargin::iter() {
            assert_eq!(VoltageMargin::from_code(margin as u8), Some(margin));
        }
        for slope in SoftStartSlope::iter() {
            assert_eq!(SoftStartSlope::from_code(slope as u8), slope);
        }
        assert_eq!(VoltageMargin::from_code(0x03), None);
    }

    #[test]
    fn set_current_limit_preserves_other_setting1_bits() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        let mut mic = converter(&bus, &pin);

        bus.push_read(&[0b0001_1111]);
        mic.set_current_limit(CurrentLimit::A5).unwrap();

        let writes = bus.writes();
        // write_read register select, then the read-modify-write result
        assert_eq!(writes.last().unwrap(), &(DEFAULT_ADDRESS, vec![0x01, 0b1101_1111]));
    }

    #[test]
    fn set_frequency_preserves_other_setting1_bits() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        let mut mic = converter(&bus, &pin);

        bus.push_read(&[0b1100_0001]);
        mic.set_frequency(Frequency::Khz1200).unwrap();

        assert_eq!(
            bus.writes().last().unwrap(),
            &(DEFAULT_ADDRESS, vec![0x01, 0b1111_1001])
        );
    }

    #[test]
    fn setting2_fields_write_into_their_bit_ranges() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        let mut mic = converter(&bus, &pin);

        bus.push_read(&[0x00]);
        mic.set_startup_delay(StartupDelay::Ms10).unwrap();
        bus.push_read(&[0x00]);
        mic.set_voltage_margin(VoltageMargin::PlusFivePercent).unwrap();
        bus.push_read(&[0x00]);
        mic.set_soft_start_slope(SoftStartSlope::Mv1500PerMs).unwrap();

        let writes = bus.writes();
        let payloads: Vec<_> = writes.iter().filter(|(_, w)| w.len() == 2).collect();
        assert_eq!(payloads[0].1, vec![0x02, 0b0111_0000]);
        assert_eq!(payloads[1].1, vec![0x02, 0b0000_1000]);
        assert_eq!(payloads[2].1, vec![0x02, 0b0000_0011]);
    }

    #[test]
    fn init_disables_clears_faults_and_programs_defaults() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        pin.force_level(true);
        let mut mic = converter(&bus, &pin);

        bus.set_default_read(&[0x00]);
        mic.init().unwrap();

        assert!(!pin.is_high());
        let writes = bus.writes();
        // First register write clears the fault flags.
        let first_payload = writes.iter().find(|(_, w)| w.len() == 2).unwrap();
        assert_eq!(first_payload.1, vec![0x04, 0x01]);
        // Current limit default is 3 A (code 0b01 in bits 7:6).
        assert!(writes.iter().any(|(_, w)| w == &vec![0x01, 0b0100_0000]));
    }

    #[test]
    fn enable_controls_only_the_gpio_line() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        let mut mic = converter(&bus, &pin);

        mic.enable().unwrap();
        assert!(pin.is_high());
        assert!(mic.intended_enabled().unwrap());
        mic.disable().unwrap();
        assert!(!pin.is_high());
        // No bus traffic for the pin-only operations.
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn status_read_failure_is_an_error_not_false() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        bus.set_read_error(true);
        let mut mic = converter(&bus, &pin);

        assert!(matches!(mic.is_power_good(), Err(Error::Bus(_))));
        assert!(matches!(mic.observed_enabled(), Err(Error::Bus(_))));
    }

    #[test]
    fn voltage_step_clamps_at_the_code_boundaries() {
        let bus = MockBus::new();
        let pin = MockPin::new();
        let mut mic = converter(&bus, &pin);

        bus.push_read(&[0xFF]);
        assert_eq!(mic.increment_output_voltage(), Err(Error::OutOfRange));
        bus.push_read(&[0x00]);
        assert_eq!(mic.decrement_output_voltage(), Err(Error::OutOfRange));

        bus.push_read(&[0x10]);
        mic.increment_output_voltage().unwrap();
        assert_eq!(
            bus.writes().last().unwrap(),
            &(DEFAULT_ADDRESS, vec![0x03, 0x11])
        );
        bus.push_read(&[0x10]);
        mic.decrement_output_voltage().unwrap();
        assert_eq!(
            bus.writes().last().unwrap(),
            &(DEFAULT_ADDRESS, vec![0x03, 0x0F])
        );
    }
}
