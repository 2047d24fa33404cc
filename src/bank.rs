//! The bench's bank of programmable power rails.
//!
//! [`RailBank`] composes the channel-select multiplexer with N converter +
//! wattmeter pairs (four on the production board). All rail devices answer
//! on the same downstream addresses, so every per-rail operation is
//! bracketed: select the rail's mux channel, operate, deselect. The bank
//! holds no cached rail state; every query round-trips to the hardware.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use embedded_hal::i2c::I2c;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ina219::{CalibrationProfile, Ina219};
use crate::mic24045::{self, CurrentLimit, Mic24045};
use crate::tca9548a::Tca9548a;

/// Cadence of the power-good poll loop.
pub const POLL_INTERVAL_MS: u32 = 10;

/// Default budget for power-good waits.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// One rail's devices: the DC/DC converter and its series wattmeter.
pub struct Rail<I2C, EN> {
    pub converter: Mic24045<I2C, EN>,
    pub meter: Ina219<I2C>,
}

impl<I2C, EN> Rail<I2C, EN> {
    pub fn new(converter: Mic24045<I2C, EN>, meter: Ina219<I2C>) -> Self {
        Self { converter, meter }
    }
}

/// A bank of `N` independently switched, current-limited,
/// voltage-programmable power rails behind one I2C multiplexer.
///
/// Rails are indexed `0..N`; rail `i` sits on mux channel `i + 1`. How the
/// drivers share the physical bus is the caller's concern (on Linux, one
/// `/dev/i2c-*` handle per driver works fine); the bank only guarantees
/// that at most one rail segment is selected at a time.
pub struct RailBank<I2C, EN, D, const N: usize = 4> {
    mux: Tca9548a<I2C>,
    rails: [Rail<I2C, EN>; N],
    delay: D,
}

impl<I2C, EN, D, const N: usize> RailBank<I2C, EN, D, N>
where
    I2C: I2c,
    EN: OutputPin + StatefulOutputPin,
    D: DelayNs,
{
    /// Assemble the bank and bring every rail to a known state: converter
    /// defaults programmed, rail disabled, wattmeter calibrated for the
    /// low-current profile. Each rail's bring-up runs under the
    /// select/deselect bracket.
    pub fn new(
        mux: Tca9548a<I2C>,
        rails: [Rail<I2C, EN>; N],
        delay: D,
    ) -> Result<Self, I2C::Error, EN::Error> {
        const {
            assert!(N >= 1 && N <= 8, "a rail per mux channel at most");
        }
        let mut bank = Self { mux, rails, delay };
        for rail in 0..N {
            bank.with_rail(rail, |r| {
                r.converter.init()?;
                r.meter
                    .calibrate(CalibrationProfile::LowCurrent)
                    .map_err(Error::cast_pin)
            })?;
            debug!(rail, "rail initialised");
        }
        Ok(bank)
    }

    /// Run `op` on one rail under the select/deselect bracket.
    ///
    /// The deselect is attempted even when `op` failed, so a fault in one
    /// rail's devices cannot leave its segment latched onto the shared
    /// bus. An error from `op` takes precedence over a deselect error; a
    /// deselect error after a successful `op` fails the operation.
    fn with_rail<T>(
        &mut self,
        rail: usize,
        op: impl FnOnce(&mut Rail<I2C, EN>) -> Result<T, I2C::Error, EN::Error>,
    ) -> Result<T, I2C::Error, EN::Error> {
        if rail >= N {
            return Err(Error::InvalidArgument);
        }
        self.mux
            .select(rail as u8 + 1)
            .map_err(Error::cast_pin)?;
        let result = op(&mut self.rails[rail]);
        let deselect = self.mux.deselect().map_err(Error::cast_pin);
        match result {
            Err(e) => Err(e),
            Ok(value) => {
                deselect?;
                Ok(value)
            }
        }
    }

    /// Number of rails in the bank.
    pub const fn rail_count(&self) -> usize {
        N
    }

    /// Switch a rail on. No confirmation is awaited; combine with
    /// [`wait_power_good`](Self::wait_power_good) when the caller needs
    /// the output in regulation.
    pub fn enable(&mut self, rail: usize) -> Result<(), I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.enable())
    }

    /// Switch a rail off.
    pub fn disable(&mut self, rail: usize) -> Result<(), I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.disable())
    }

    /// The state of the rail's enable line (what the bench asked for).
    pub fn intended_enabled(&mut self, rail: usize) -> Result<bool, I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.intended_enabled())
    }

    /// The enable state the converter itself reports. May lag
    /// [`intended_enabled`](Self::intended_enabled) while VIN is absent.
    pub fn observed_enabled(&mut self, rail: usize) -> Result<bool, I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.observed_enabled())
    }

    /// Program a rail's converter current limit.
    pub fn set_current_limit(
        &mut self,
        rail: usize,
        limit: CurrentLimit,
    ) -> Result<(), I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.set_current_limit(limit))
    }

    /// Re-calibrate a rail's wattmeter.
    pub fn calibrate(
        &mut self,
        rail: usize,
        profile: CalibrationProfile,
    ) -> Result<(), I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.meter.calibrate(profile).map_err(Error::cast_pin))
    }

    /// Program a rail's raw output-voltage register code.
    pub fn set_voltage_code(&mut self, rail: usize, code: u8) -> Result<(), I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.set_output_voltage(code))
    }

    /// Program a rail's output voltage in millivolts.
    pub fn set_voltage_mv(&mut self, rail: usize, mv: u32) -> Result<(), I2C::Error, EN::Error> {
        let code = mic24045::millivolts_to_register(mv)?;
        self.set_voltage_code(rail, code)
    }

    /// Program a rail's output voltage in volts.
    pub fn set_voltage_v(&mut self, rail: usize, volts: f32) -> Result<(), I2C::Error, EN::Error> {
        let code = mic24045::volts_to_register(volts)?;
        self.set_voltage_code(rail, code)
    }

    /// Whether a rail's converter reports its output in regulation.
    pub fn is_power_good(&mut self, rail: usize) -> Result<bool, I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.converter.is_power_good())
    }

    /// Poll a rail's power-good flag at a fixed 10 ms cadence until it is
    /// set or `timeout_ms` is spent.
    ///
    /// The first poll happens immediately; after a negative poll the wait
    /// gives up, without sleeping again, as soon as the next poll could
    /// not happen before the timeout. A 30 ms budget therefore buys polls
    /// at 0/10/20 ms, a 35 ms budget polls at 0/10/20/30 ms; the loop
    /// never sleeps past the budget.
    pub fn wait_power_good(
        &mut self,
        rail: usize,
        timeout_ms: u32,
    ) -> Result<(), I2C::Error, EN::Error> {
        let mut elapsed = 0;
        loop {
            if self.is_power_good(rail)? {
                return Ok(());
            }
            if elapsed + POLL_INTERVAL_MS >= timeout_ms {
                debug!(rail, timeout_ms, "power-good wait timed out");
                return Err(Error::Timeout);
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
            elapsed += POLL_INTERVAL_MS;
            trace!(rail, elapsed, "power-good still low");
        }
    }

    /// Rail bus voltage in volts, from the wattmeter.
    pub fn bus_voltage_v(&mut self, rail: usize) -> Result<f32, I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.meter.bus_voltage_v().map_err(Error::cast_pin))
    }

    /// Rail current in milliamps, from the wattmeter.
    pub fn current_ma(&mut self, rail: usize) -> Result<f32, I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.meter.current_ma().map_err(Error::cast_pin))
    }

    /// Rail power in milliwatts, from the wattmeter.
    pub fn power_mw(&mut self, rail: usize) -> Result<f32, I2C::Error, EN::Error> {
        self.with_rail(rail, |r| r.meter.power_mw().map_err(Error::cast_pin))
    }

    // Whole-bank operations. Rails are visited in index order and the
    // first failure aborts the loop; rails already touched keep whatever
    // state they reached (no rollback).

    pub fn enable_all(&mut self) -> Result<(), I2C::Error, EN::Error> {
        for rail in 0..N {
            self.enable(rail)?;
        }
        Ok(())
    }

    pub fn disable_all(&mut self) -> Result<(), I2C::Error, EN::Error> {
        for rail in 0..N {
            self.disable(rail)?;
        }
        Ok(())
    }

    pub fn set_current_limit_all(&mut self, limit: CurrentLimit) -> Result<(), I2C::Error, EN::Error> {
        for rail in 0..N {
            self.set_current_limit(rail, limit)?;
        }
        Ok(())
    }

    pub fn calibrate_all(&mut self, profile: CalibrationProfile) -> Result<(), I2C::Error, EN::Error> {
        for rail in 0..N {
            self.calibrate(rail, profile)?;
        }
        Ok(())
    }

    pub fn set_voltage_code_all(&mut self, code: u8) -> Result<(), I2C::Error, EN::Error> {
        for rail in 0..N {
            self.set_voltage_code(rail, code)?;
        }
        Ok(())
    }

    pub fn set_voltage_mv_all(&mut self, mv: u32) -> Result<(), I2C::Error, EN::Error> {
        let code = mic24045::millivolts_to_register(mv)?;
        self.set_voltage_code_all(code)
    }

    pub fn set_voltage_v_all(&mut self, volts: f32) -> Result<(), I2C::Error, EN::Error> {
        let code = mic24045::volts_to_register(volts)?;
        self.set_voltage_code_all(code)
    }

    /// Whether every rail reports power-good. Stops at the first rail that
    /// does not.
    pub fn is_power_good_all(&mut self) -> Result<bool, I2C::Error, EN::Error> {
        for rail in 0..N {
            if !self.is_power_good(rail)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Wait for power-good on every rail, in index order, each with its
    /// own `timeout_ms` budget.
    pub fn wait_power_good_all(&mut self, timeout_ms: u32) -> Result<(), I2C::Error, EN::Error> {
        for rail in 0..N {
            self.wait_power_good(rail, timeout_ms)?;
        }
        Ok(())
    }

    /// Bus voltage of every rail, in index order.
    pub fn bus_voltages_v(&mut self) -> Result<[f32; N], I2C::Error, EN::Error> {
        let mut out = [0.0; N];
        for rail in 0..N {
            out[rail] = self.bus_voltage_v(rail)?;
        }
        Ok(out)
    }

    /// Current of every rail, in index order.
    pub fn currents_ma(&mut self) -> Result<[f32; N], I2C::Error, EN::Error> {
        let mut out = [0.0; N];
        for rail in 0..N {
            out[rail] = self.current_ma(rail)?;
        }
        Ok(out)
    }

    /// Convert volts to the converters' register code. All rails carry the
    /// same converter model, so one conversion serves the whole bank.
    pub fn volts_to_code(&self, volts: f32) -> Result<u8, I2C::Error, EN::Error> {
        Ok(mic24045::volts_to_register(volts)?)
    }

    /// Convert a converter register code to volts.
    pub fn code_to_volts(&self, code: u8) -> f32 {
        mic24045::register_to_volts(code)
    }
}
