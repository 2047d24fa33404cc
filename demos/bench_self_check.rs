//! Bench self check: bring the rail bank up, exercise each rail at a few
//! voltages, and probe the on-board sensors.
//!
//! Run on the bench Pi with `cargo run --example bench_self_check`.

use std::env;

use linux_embedded_hal::{Delay, I2cdev};
use railbench::bank::{Rail, RailBank, DEFAULT_TIMEOUT_MS};
use railbench::{ads1115, bme280, ds18b20, ina219, jt103, lm75, mic24045, shtc3, tca9548a};
use rppal::gpio::Gpio;

const I2C_BUS: &str = "/dev/i2c-1";
// Enable lines of rails 1-4, in BCM numbering.
const ENABLE_PINS: [u8; 4] = [5, 6, 19, 26];
// Voltages each rail is stepped through.
const CHECK_VOLTAGES: [f32; 3] = [1.2, 2.5, 3.3];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bus = env::args().nth(1).unwrap_or_else(|| I2C_BUS.to_string());
    let gpio = Gpio::new()?;
    let mut passed = true;

    // Rail bank.
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
    println!("[ ok ] rail bank initialised");

    for rail in 0..bank.rail_count() {
        for target in CHECK_VOLTAGES {
            bank.set_voltage_v(rail, target)?;
            bank.enable(rail)?;
            match bank.wait_power_good(rail, DEFAULT_TIMEOUT_MS) {
                Ok(()) => {
                    let measured = bank.bus_voltage_v(rail)?;
                    let verdict = if (measured - target).abs() < 0.1 { "ok" } else { "FAIL" };
                    if verdict == "FAIL" {
                        passed = false;
                    }
                    println!("[{verdict:^4}] rail {rail} at {target} V reads {measured:.3} V");
                }
                Err(e) => {
                    passed = false;
                    println!("[FAIL] rail {rail} at {target} V: {e}");
                }
            }
        }
        bank.disable(rail)?;
    }

    // Sensors; each is optional on a given bench, so failures are reported
    // but only unexpected ones count against the verdict.
    let mut lm75 = lm75::Lm75::new(I2cdev::new(&bus)?, lm75::DEFAULT_ADDRESS);
    match lm75.read_temperature() {
        Ok(celsius) => println!("[ ok ] LM75: {celsius:.2} degC"),
        Err(e) => println!("[skip] LM75: {e}"),
    }

    let mut shtc3 = shtc3::Shtc3::new(I2cdev::new(&bus)?, Delay);
    match shtc3.wake().and_then(|_| shtc3.measure(false)) {
        Ok(m) => println!(
            "[ ok ] SHTC3: {:.2} degC, {:.1} %RH",
            m.temperature_c, m.humidity_rh
        ),
        Err(e) => println!("[skip] SHTC3: {e}"),
    }

    let mut bme = bme280::Bme280::new(I2cdev::new(&bus)?, Delay, bme280::DEFAULT_ADDRESS);
    match bme.init().and_then(|_| {
        Ok((bme.read_temperature()?, bme.read_pressure()?, bme.read_humidity()?))
    }) {
        Ok((t, p, h)) => println!("[ ok ] BME280: {t:.2} degC, {p:.1} hPa, {h:.1} %RH"),
        Err(e) => println!("[skip] BME280: {e}"),
    }

    let adc = ads1115::Ads1115::new(I2cdev::new(&bus)?, Delay, ads1115::DEFAULT_ADDRESS);
    let mut thermistor = jt103::Jt103::new(adc, ads1115::Input::A0);
    match thermistor.read_temperature() {
        Ok(celsius) => println!("[ ok ] JT103: {celsius:.2} degC"),
        Err(e) => println!("[skip] JT103: {e}"),
    }

    match ds18b20::Ds18b20::enumerate() {
        Ok(sensors) if sensors.is_empty() => println!("[skip] DS18B20: none enumerated"),
        Ok(sensors) => {
            for sensor in sensors {
                match sensor.read_temperature() {
                    Ok(celsius) => println!("[ ok ] DS18B20: {celsius:.3} degC"),
                    Err(e) => println!("[skip] DS18B20: {e}"),
                }
            }
        }
        Err(e) => println!("[skip] DS18B20: {e}"),
    }

    bank.disable_all()?;
    if passed {
        println!("self check passed");
        Ok(())
    } else {
        Err("self check failed".into())
    }
}
