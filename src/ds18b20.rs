//! DS18B20 1-Wire temperature sensor.
//!
//! The bench does not drive the 1-Wire bus itself; the kernel's w1
//! subsystem does, and exposes each sensor as a `w1_slave` file under
//! sysfs. This module just parses that file:
//!
//! ```text
//! 2d 00 4b 46 ff ff 02 10 19 : crc=19 YES
//! 2d 00 4b 46 ff ff 02 10 19 t=22562
//! ```
//!
//! Requires the `w1-gpio`/`w1-therm` overlays and a pull-up on the data
//! line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Where the kernel surfaces enumerated 1-Wire devices.
const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// Family-code prefix of DS18B20 device ids.
const DS18B20_PREFIX: &str = "28-";

/// Errors from the kernel w1 interface.
#[derive(Error, Debug)]
pub enum W1Error {
    #[error("reading the w1_slave file failed")]
    Io(#[from] io::Error),
    #[error("sensor reported a checksum failure")]
    Crc,
    #[error("unparseable w1_slave contents")]
    Parse,
}

/// One DS18B20 sensor, identified by its w1_slave file.
pub struct Ds18b20 {
    path: PathBuf,
}

impl Ds18b20 {
    /// Sensor from a full `w1_slave` path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sensor from a device id such as `28-011927fdb603`.
    pub fn from_id(id: &str) -> Self {
        Self {
            path: Path::new(W1_DEVICES_DIR).join(id).join("w1_slave"),
        }
    }

    /// All DS18B20 sensors the kernel has enumerated.
    pub fn enumerate() -> io::Result<Vec<Ds18b20>> {
        let mut sensors = Vec::new();
        for entry in fs::read_dir(W1_DEVICES_DIR)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(DS18B20_PREFIX) {
                sensors.push(Self::from_path(entry.path().join("w1_slave")));
            }
        }
        Ok(sensors)
    }

    /// Temperature in degrees Celsius.
    pub fn read_temperature(&self) -> Result<f32, W1Error> {
        parse_w1_slave(&fs::read_to_string(&self.path)?)
    }
}

/// Parse the two-line w1_slave format: a CRC verdict line, then the
/// reading in milli-degrees after `t=`.
fn parse_w1_slave(contents: &str) -> Result<f32, W1Error> {
    let mut lines = contents.lines();
    let crc_line = lines.next().ok_or(W1Error::Parse)?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(W1Error::Crc);
    }
    let data_line = lines.next().ok_or(W1Error::Parse)?;
    let (_, milli) = data_line.split_once("t=").ok_or(W1Error::Parse)?;
    let milli: i32 = milli.trim().parse().map_err(|_| W1Error::Parse)?;
    Ok(milli as f32 / 1000.0)
}
