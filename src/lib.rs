//! This crate provides drivers for a Raspberry-Pi-hosted embedded test
//! bench built around four programmable power rails.
//!
//! On-board hardware covered here:
//! * TCA9548A I2C multiplexer selecting one rail's bus segment at a time
//! * MIC24045 DC/DC converter per rail (enable line, current limit,
//!   piecewise-linear output-voltage register)
//! * INA219 wattmeter per rail (bus voltage, current, power)
//! * ADS1115 16-bit ADC with a 103JT thermistor input
//! * LM75, SHTC3 and BME280 temperature/environment sensors
//! * DS18B20 1-Wire sensors through the kernel w1 interface
//!
//! [`bank::RailBank`] composes the multiplexer with the per-rail devices
//! and brackets every rail operation with the mandatory channel
//! select/deselect, which is the usual entry point:
//!
//! ```no_run
//! use linux_embedded_hal::{Delay, I2cdev};
//! use railbench::bank::{Rail, RailBank};
//! use railbench::{ina219, mic24045, tca9548a};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let pins: Vec<rppal::gpio::OutputPin> = Vec::new();
//! let mux = tca9548a::Tca9548a::new(I2cdev::new("/dev/i2c-1")?, tca9548a::DEFAULT_ADDRESS);
//! let rails: [_; 4] = pins
//!     .into_iter()
//!     .map(|pin| {
//!         Rail::new(
//!             mic24045::Mic24045::new(
//!                 I2cdev::new("/dev/i2c-1").unwrap(),
//!                 pin,
//!                 mic24045::DEFAULT_ADDRESS,
//!             ),
//!             ina219::Ina219::new(I2cdev::new("/dev/i2c-1").unwrap(), ina219::DEFAULT_ADDRESS),
//!         )
//!     })
//!     .collect::<Vec<_>>()
//!     .try_into()
//!     .map_err(|_| "need four enable pins")?;
//!
//! let mut bank = RailBank::new(mux, rails, Delay)?;
//! bank.set_voltage_v_all(3.3)?;
//! bank.enable_all()?;
//! bank.wait_power_good_all(1000)?;
//! println!("rail voltages: {:?}", bank.bus_voltages_v()?);
//! bank.disable_all()?;
//! # Ok(())
//! # }
//! ```
//!
//! All drivers are generic over [`embedded_hal`] 1.x traits; on the Pi the
//! `linux-embedded-hal` and `rppal` crates provide the implementations.
//! Note that I2C must be enabled on the host, e.g. with `sudo raspi-config`.

pub mod ads1115;
pub mod bank;
pub mod bme280;
pub mod ds18b20;
pub mod error;
pub mod ina219;
pub mod jt103;
pub mod lm75;
pub mod mic24045;
pub mod shtc3;
pub mod tca9548a;

#[cfg(test)]
mod mock;
