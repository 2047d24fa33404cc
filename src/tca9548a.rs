//! TCA9548A 8-channel I2C multiplexer.
//!
//! The device has a single control register and no sub-register addressing:
//! a plain write latches the downstream-channel bitmask, a plain read
//! returns it. [`Tca9548a::select`] keeps the latch single-hot so at most
//! one downstream segment is reachable at a time.

use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

/// Factory-default I2C address (all three address pins low).
pub const DEFAULT_ADDRESS: u8 = 0x70;

/// Number of downstream bus segments.
pub const CHANNEL_COUNT: u8 = 8;

/// TCA9548A I2C multiplexer.
pub struct Tca9548a<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Tca9548a<I2C> {
    /// Create a new driver for the multiplexer at `address`.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Activate a single downstream channel.
    ///
    /// `channel` 1-8 activates exactly that segment; 0 deactivates all of
    /// them. No client-side state is kept, the control register is written
    /// on every call.
    pub fn select(&mut self, channel: u8) -> Result<(), I2C::Error> {
        if channel > CHANNEL_COUNT {
            return Err(Error::InvalidArgument);
        }
        let mask = if channel == 0 { 0 } else { 1 << (channel - 1) };
        self.i2c.write(self.address, &[mask]).map_err(Error::Bus)
    }

    /// Deactivate all downstream channels.
    pub fn deselect(&mut self) -> Result<(), I2C::Error> {
        self.select(0)
    }

    /// Read back the raw channel bitmask currently latched on the device.
    pub fn read(&mut self) -> Result<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c.read(self.address, &mut buf).map_err(Error::Bus)?;
        Ok(buf[0])
    }

    /// Decode the latched bitmask into 1-based channel numbers.
    ///
    /// [`select`](Self::select) keeps the latch single-hot, but the register
    /// accepts arbitrary masks if written directly, so more than one entry
    /// is possible.
    pub fn active_channels(&mut self) -> Result<Vec<u8>, I2C::Error> {
        let raw = self.read()?;
        Ok((1..=CHANNEL_COUNT)
            .filter(|ch| raw & (1 << (ch - 1)) != 0)
            .collect())
    }
}
