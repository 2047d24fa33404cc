//! Sweep one rail's supply voltage and log the power draw at each step.
//!
//! Walks the converter's register codes between two voltages, one code at
//! a time, and prints a CSV row per step. Redirect stdout to capture a
//! curve: `cargo run --example voltage_sweep > sweep.csv`.

use std::env;
use std::thread;
use std::time::Duration;

use linux_embedded_hal::{Delay, I2cdev};
use railbench::bank::{Rail, RailBank, DEFAULT_TIMEOUT_MS};
use railbench::{ina219, mic24045, tca9548a};
use rppal::gpio::Gpio;

const I2C_BUS: &str = "/dev/i2c-1";
// Enable lines of rails 1-4, in BCM numbering.
const ENABLE_PINS: [u8; 4] = [5, 6, 19, 26];
// Rail under test and sweep limits.
const RAIL: usize = 0;
const VOLT_MIN: f32 = 1.5;
const VOLT_MAX: f32 = 3.3;
// Settle time before each measurement, and hold time after it.
const DELAY_PRE_MS: u64 = 1000;
const DELAY_POST_MS: u64 = 500;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bus = env::args().nth(1).unwrap_or_else(|| I2C_BUS.to_string());
    let gpio = Gpio::new()?;

    let mux = tca9548a::Tca9548a::new(I2cdev::new(&bus)?, tca9548a::DEFAULT_ADDRESS);
    let mut rails = Vec::new();
    for pin in ENABLE_PINS {
        rails.push(Rail::new(
            mic24045::Mic24045::new(
                I2cdev::new(&bus)?,
                gpio.get(pin)?.into_output(),
                mic24045::DEFAULT_ADDRESS,
            ),
            ina219::Ina219::new(I2cdev::new(&bus)?, ina219::DEFAULT_ADDRESS),
        ));
    }
    let rails: [_; 4] = rails.try_into().map_err(|_| "rail construction failed")?;
    let mut bank = RailBank::new(mux, rails, Delay)?;

    let code_low = mic24045::volts_to_register(VOLT_MIN)?;
    let code_high = mic24045::volts_to_register(VOLT_MAX)?;

    bank.set_voltage_code(RAIL, code_low)?;
    bank.enable(RAIL)?;
    bank.wait_power_good(RAIL, DEFAULT_TIMEOUT_MS)?;

    println!("code,volt_set,volt_meas,current_ma,power_mw");
    for code in code_low..=code_high {
        bank.set_voltage_code(RAIL, code)?;
        thread::sleep(Duration::from_millis(DELAY_PRE_MS));

        let volt_set = mic24045::register_to_volts(code);
        let volt_meas = bank.bus_voltage_v(RAIL)?;
        let current = bank.current_ma(RAIL)?;
        let power = bank.power_mw(RAIL)?;
        println!("{code},{volt_set:.3},{volt_meas:.3},{current:.2},{power:.2}");

        thread::sleep(Duration::from_millis(DELAY_POST_MS));
    }

    bank.disable(RAIL)?;
    Ok(())
}
