//! BME280 combined temperature / pressure / humidity sensor.
//!
//! The raw readings are meaningless without the per-device calibration
//! coefficients burnt into its NVM, so [`Bme280::init`] reads those before
//! anything else and configures the bench defaults (x1 oversampling on all
//! three channels, 250 ms standby, filter off, normal mode). Compensation
//! follows the Bosch datasheet: integer arithmetic for temperature and
//! pressure, float for humidity, all three sharing the fine-resolution
//! temperature.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use strum_macros::EnumIter;
use tracing::debug;

use crate::error::{Error, Result};

/// Default I2C address (SDO low; 0x77 with SDO high).
pub const DEFAULT_ADDRESS: u8 = 0x76;

/// Value of the chip-id register on a genuine BME280.
pub const CHIP_ID: u8 = 0x60;

/// Magic byte triggering a reset when written to the reset register.
const RESET_VALUE: u8 = 0xB6;

/// STATUS bit set while a conversion is running.
const STATUS_MEASURING: u8 = 0x08;

/// Conversion-ready poll cadence and default budget.
const READY_POLL_MS: u32 = 5;
const READY_TIMEOUT_MS: u32 = 500;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
enum Register {
    ChipId = 0xD0,
    Reset = 0xE0,
    /// __R/W__ - Humidity oversampling.
    CtrlHum = 0xF2,
    /// __R__ - Conversion status.
    Status = 0xF3,
    /// __R/W__ - Temperature/pressure oversampling and mode.
    CtrlMeas = 0xF4,
    /// __R/W__ - Standby time, filter, SPI enable.
    Config = 0xF5,
    PressMsb = 0xF7,
    TempMsb = 0xFA,
    HumMsb = 0xFD,
    /// First register of the T/P calibration block.
    CalibTp = 0x88,
    /// H1 sits alone below the second block.
    CalibH1 = 0xA1,
    /// First register of the H2..H6 calibration block.
    CalibH2 = 0xE1,
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

// ctrl_meas / ctrl_hum / config field layout.
const OSRS_T_OFFSET: u8 = 5;
const OSRS_T_KEEP_MASK: u8 = 0x1F;
const OSRS_P_OFFSET: u8 = 2;
const OSRS_P_KEEP_MASK: u8 = 0xE3;
const OSRS_H_KEEP_MASK: u8 = 0xF8;
const MODE_KEEP_MASK: u8 = 0xFC;
const T_SB_OFFSET: u8 = 5;
const T_SB_KEEP_MASK: u8 = 0x1F;
const FILTER_OFFSET: u8 = 2;
const FILTER_KEEP_MASK: u8 = 0xE3;

/// Oversampling factor for one measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Oversampling {
    Skipped = 0x00,
    X1 = 0x01,
    X2 = 0x02,
    X4 = 0x03,
    X8 = 0x04,
    X16 = 0x05,
}

/// Sensor operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Mode {
    Sleep = 0x00,
    Forced = 0x01,
    Normal = 0x03,
}

/// Inactive time between normal-mode measurement cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Standby {
    Ms0_5 = 0x00,
    Ms62_5 = 0x01,
    Ms125 = 0x02,
    Ms250 = 0x03,
    Ms500 = 0x04,
    Ms1000 = 0x05,
    Ms10 = 0x06,
    Ms20 = 0x07,
}

/// IIR filter time constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Filter {
    Off = 0x00,
    X2 = 0x01,
    X4 = 0x02,
    X8 = 0x03,
    X16 = 0x04,
}

/// Per-device compensation coefficients from the sensor's NVM.
#[derive(Debug, Clone, Copy, Default)]
struct Calibration {
    dig_t1: u16,
    dig_t2: i16,
    dig_t3: i16,
    dig_p1: u16,
    dig_p2: i16,
    dig_p3: i16,
    dig_p4: i16,
    dig_p5: i16,
    dig_p6: i16,
    dig_p7: i16,
    dig_p8: i16,
    dig_p9: i16,
    dig_h1: u8,
    dig_h2: i16,
    dig_h3: u8,
    dig_h4: i16,
    dig_h5: i16,
    dig_h6: i8,
}

/// BME280 environmental sensor.
pub struct Bme280<I2C, D> {
    i2c: I2C,
    address: u8,
    delay: D,
    calibration: Option<Calibration>,
    /// Fine-resolution temperature shared by all three compensations.
    t_fine: i32,
}

impl<I2C, D> Bme280<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, address, delay, calibration: None, t_fine: 0 }
    }

    /// Verify the chip id, load the calibration coefficients and program
    /// the bench defaults: x1 oversampling everywhere, 250 ms standby,
    /// filter off, normal mode.
    pub fn init(&mut self) -> Result<(), I2C::Error> {
        let id = self.read_u8(Register::ChipId as u8)?;
        if id != CHIP_ID {
            return Err(Error::InvalidResponse);
        }
        self.calibration = Some(self.load_calibration()?);
        self.set_temperature_oversampling(Oversampling::X1)?;
        self.set_pressure_oversampling(Oversampling::X1)?;
        self.set_humidity_oversampling(Oversampling::X1)?;
        self.set_standby(Standby::Ms250)?;
        self.set_filter(Filter::Off)?;
        self.set_mode(Mode::Normal)?;
        debug!(address = self.address, "environmental sensor initialised");
        Ok(())
    }

    fn read_u8(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn read_i8(&mut self, register: u8) -> Result<i8, I2C::Error> {
        Ok(self.read_u8(register)? as i8)
    }

    fn read_u16_le(&mut self, register: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(Error::Bus)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_i16_le(&mut self, register: u8) -> Result<i16, I2C::Error> {
        Ok(self.read_u16_le(register)? as i16)
    }

    fn write_u8(&mut self, register: Register, value: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write(self.address, &[register.into(), value])
            .map_err(Error::Bus)
    }

    fn update_u8(&mut self, register: Register, keep_mask: u8, field: u8) -> Result<(), I2C::Error> {
        let current = self.read_u8(register.into())?;
        self.write_u8(register, (current & keep_mask) | field)
    }

    fn load_calibration(&mut self) -> Result<Calibration, I2C::Error> {
        let tp = Register::CalibTp as u8;
        let h2 = Register::CalibH2 as u8;

        // dig_H4/H5 share the nibbles of 0xE5.
        let e4 = self.read_i8(h2 + 3)?;
        let e5 = self.read_u8(h2 + 4)?;
        let e6 = self.read_i8(h2 + 5)?;

        Ok(Calibration {
            dig_t1: self.read_u16_le(tp)?,
            dig_t2: self.read_i16_le(tp + 2)?,
            dig_t3: self.read_i16_le(tp + 4)?,
            dig_p1: self.read_u16_le(tp + 6)?,
            dig_p2: self.read_i16_le(tp + 8)?,
            dig_p3: self.read_i16_le(tp + 10)?,
            dig_p4: self.read_i16_le(tp + 12)?,
            dig_p5: self.read_i16_le(tp + 14)?,
            dig_p6: self.read_i16_le(tp + 16)?,
            dig_p7: self.read_i16_le(tp + 18)?,
            dig_p8: self.read_i16_le(tp + 20)?,
            dig_p9: self.read_i16_le(tp + 22)?,
            dig_h1: self.read_u8(Register::CalibH1 as u8)?,
            dig_h2: self.read_i16_le(h2)?,
            dig_h3: self.read_u8(h2 + 2)?,
            dig_h4: (i16::from(e4) << 4) | i16::from(e5 & 0x0F),
            dig_h5: (i16::from(e6) << 4) | i16::from(e5 >> 4),
            dig_h6: self.read_i8(h2 + 6)?,
        })
    }

    /// Request a device reset. Calibration data survives on the device but
    /// the driver re-reads it on the next [`init`](Self::init).
    pub fn reset(&mut self) -> Result<(), I2C::Error> {
        self.calibration = None;
        self.t_fine = 0;
        self.write_u8(Register::Reset, RESET_VALUE)
    }

    pub fn set_temperature_oversampling(&mut self, osrs: Oversampling) -> Result<(), I2C::Error> {
        self.update_u8(Register::CtrlMeas, OSRS_T_KEEP_MASK, (osrs as u8) << OSRS_T_OFFSET)
    }

    pub fn set_pressure_oversampling(&mut self, osrs: Oversampling) -> Result<(), I2C::Error> {
        self.update_u8(Register::CtrlMeas, OSRS_P_KEEP_MASK, (osrs as u8) << OSRS_P_OFFSET)
    }

    /// Humidity oversampling only latches on the next ctrl_meas write, per
    /// the datasheet; callers changing it on the fly should re-set the
    /// mode afterwards.
    pub fn set_humidity_oversampling(&mut self, osrs: Oversampling) -> Result<(), I2C::Error> {
        self.update_u8(Register::CtrlHum, OSRS_H_KEEP_MASK, osrs as u8)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), I2C::Error> {
        self.update_u8(Register::CtrlMeas, MODE_KEEP_MASK, mode as u8)
    }

    pub fn set_standby(&mut self, standby: Standby) -> Result<(), I2C::Error> {
        self.update_u8(Register::Config, T_SB_KEEP_MASK, (standby as u8) << T_SB_OFFSET)
    }

    pub fn set_filter(&mut self, filter: Filter) -> Result<(), I2C::Error> {
        self.update_u8(Register::Config, FILTER_KEEP_MASK, (filter as u8) << FILTER_OFFSET)
    }

    /// Block until the current conversion finished, polling the status
    /// register every 5 ms up to `timeout_ms`.
    pub fn wait_for_ready(&mut self, timeout_ms: u32) -> Result<(), I2C::Error> {
        let mut elapsed = 0;
        while self.read_u8(Register::Status as u8)? & STATUS_MEASURING != 0 {
            if elapsed >= timeout_ms {
                return Err(Error::Timeout);
            }
            self.delay.delay_ms(READY_POLL_MS);
            elapsed += READY_POLL_MS;
        }
        Ok(())
    }

    /// 20-bit raw reading from a 3-byte measurement block.
    fn read_raw_20(&mut self, register: Register) -> Result<u32, I2C::Error> {
        self.wait_for_ready(READY_TIMEOUT_MS)?;
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(self.address, &[register.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok((u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2])) >> 4)
    }

    fn read_raw_humidity(&mut self) -> Result<u16, I2C::Error> {
        self.wait_for_ready(READY_TIMEOUT_MS)?;
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[Register::HumMsb.into()], &mut buf)
            .map_err(Error::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn calibration(&self) -> Result<Calibration, I2C::Error> {
        self.calibration.ok_or(Error::NotCalibrated)
    }

    /// Compensated temperature in degrees Celsius (datasheet 8.2).
    ///
    /// Also refreshes the shared fine-resolution temperature used by the
    /// pressure and humidity compensations.
    pub fn read_temperature(&mut self) -> Result<f32, I2C::Error> {
        let cal = self.calibration()?;
        let raw = self.read_raw_20(Register::TempMsb)? as i32;

        let t1 = i32::from(cal.dig_t1);
        let t2 = i32::from(cal.dig_t2);
        let t3 = i32::from(cal.dig_t3);
        let var1 = (((raw >> 3) - (t1 << 1)) * t2) >> 11;
        let var2 = (((((raw >> 4) - t1) * ((raw >> 4) - t1)) >> 12) * t3) >> 14;
        self.t_fine = var1 + var2;

        Ok(((self.t_fine * 5 + 128) >> 8) as f32 / 100.0)
    }

    /// Compensated pressure in hectopascal (datasheet 8.2).
    pub fn read_pressure(&mut self) -> Result<f32, I2C::Error> {
        let cal = self.calibration()?;
        let raw = self.read_raw_20(Register::PressMsb)? as i32;
        if self.t_fine == 0 {
            self.read_temperature()?;
        }

        let mut var1 = (self.t_fine >> 1) - 64000;
        let mut var2 = (((var1 >> 2) * (var1 >> 2)) >> 11) * i32::from(cal.dig_p6);
        var2 += (var1 * i32::from(cal.dig_p5)) << 1;
        var2 = (var2 >> 2) + (i32::from(cal.dig_p4) << 16);
        var1 = (((i32::from(cal.dig_p3) * (((var1 >> 2) * (var1 >> 2)) >> 13)) >> 3)
            + ((i32::from(cal.dig_p2) * var1) >> 1))
            >> 18;
        var1 = ((32768 + var1) * i32::from(cal.dig_p1)) >> 15;
        if var1 == 0 {
            // Pressure would divide by zero with uninitialised coefficients.
            return Err(Error::InvalidResponse);
        }

        let mut pressure = (((1048576 - raw) - (var2 >> 12)) as u32).wrapping_mul(3125);
        if pressure < 0x8000_0000 {
            pressure = (pressure << 1) / var1 as u32;
        } else {
            pressure = (pressure / var1 as u32) * 2;
        }
        let p = pressure as i32;
        let var1 = (i32::from(cal.dig_p9) * (((p >> 3) * (p >> 3)) >> 13)) >> 12;
        let var2 = ((p >> 2) * i32::from(cal.dig_p8)) >> 13;
        let pressure = p + ((var1 + var2 + i32::from(cal.dig_p7)) >> 4);

        Ok(pressure as f32 / 100.0)
    }

    /// Compensated relative humidity in percent (datasheet 4.2.3).
    pub fn read_humidity(&mut self) -> Result<f32, I2C::Error> {
        let cal = self.calibration()?;
        let raw = self.read_raw_humidity()?;
        if self.t_fine == 0 {
            self.read_temperature()?;
        }

        let h = self.t_fine as f32 - 76800.0;
        let h = (f32::from(raw)
            - (f32::from(cal.dig_h4) * 64.0 + f32::from(cal.dig_h5) / 16384.0 * h))
            * (f32::from(cal.dig_h2) / 65536.0
                * (1.0
                    + f32::from(cal.dig_h6) / 67108864.0
                        * h
                        * (1.0 + f32::from(cal.dig_h3) / 67108864.0 * h)));
        let h = h * (1.0 - f32::from(cal.dig_h1) * h / 524288.0);

        Ok(h.clamp(0.0, 100.0))
    }

    /// Dew point in degrees Celsius, from the simple span approximation
    /// (only accurate above roughly 50 %RH).
    pub fn read_dewpoint(&mut self) -> Result<f32, I2C::Error> {
        let celsius = self.read_temperature()?;
        let humidity = self.read_humidity()?;
        Ok(celsius - ((100.0 - humidity) / 5.0))
    }
}
