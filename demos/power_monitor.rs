//! Continuously print voltage/current/power of all four bench rails.
//!
//! Run on the bench Pi with `cargo run --example power_monitor`.

use std::env;
use std::thread;
use std::time::Duration;

use linux_embedded_hal::{Delay, I2cdev};
use railbench::bank::{Rail, RailBank, DEFAULT_TIMEOUT_MS};
use railbench::{ina219, mic24045, tca9548a};
use rppal::gpio::Gpio;

// Configuration constants - adjust these for your setup
const I2C_BUS: &str = "/dev/i2c-1";
// Enable lines of rails 1-4, in BCM numbering.
const ENABLE_PINS: [u8; 4] = [5, 6, 19, 26];
const OUTPUT_VOLTAGE: f32 = 3.3;
const SAMPLE_INTERVAL_MS: u64 = 1000;

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
    println!("bank up, programming {OUTPUT_VOLTAGE} V on all rails");

    bank.disable_all()?;
    bank.set_voltage_v_all(OUTPUT_VOLTAGE)?;
    bank.enable_all()?;
    bank.wait_power_good_all(DEFAULT_TIMEOUT_MS)?;

    loop {
        for rail in 0..bank.rail_count() {
            let volts = bank.bus_voltage_v(rail)?;
            let milliamps = bank.current_ma(rail)?;
            let milliwatts = bank.power_mw(rail)?;
            println!("rail {rail}: {volts:6.3} V  {milliamps:8.2} mA  {milliwatts:8.2} mW");
        }
        println!();
        thread::sleep(Duration::from_millis(SAMPLE_INTERVAL_MS));
    }
}
