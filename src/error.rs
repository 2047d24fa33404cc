//! Our error types for the test-bench drivers.

use core::convert::Infallible;

use thiserror::Error;

pub type Result<T, E, P = Infallible> = core::result::Result<T, Error<E, P>>;

/// Custom error type for the bench devices.
///
/// `E` is the I2C bus error of the transport in use, `P` the error of a
/// driver's enable-pin (drivers without a pin leave it at [`Infallible`]).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error<E, P = Infallible> {
    #[error("I2C bus transaction failed")]
    Bus(E),
    #[error("enable line operation failed")]
    Pin(P),
    #[error("argument outside the supported range")]
    InvalidArgument,
    #[error("value outside the device's programmable range")]
    OutOfRange,
    #[error("timed out waiting for the device")]
    Timeout,
    #[error("measurement requested before calibration")]
    NotCalibrated,
    #[error("invalid response received")]
    InvalidResponse,
    #[error("checksum mismatch in sensor reply")]
    Crc,
}

impl<E> Error<E, Infallible> {
    /// Re-type a pin-less error so it can flow through an API whose pin
    /// error is `P`.
    pub fn cast_pin<P>(self) -> Error<E, P> {
        match self {
            Error::Bus(e) => Error::Bus(e),
            Error::Pin(p) => match p {},
            Error::InvalidArgument => Error::InvalidArgument,
            Error::OutOfRange => Error::OutOfRange,
            Error::Timeout => Error::Timeout,
            Error::NotCalibrated => Error::NotCalibrated,
            Error::InvalidResponse => Error::InvalidResponse,
            Error::Crc => Error::Crc,
        }
    }
}

/// A requested output voltage has no register code on the DC/DC converter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("voltage outside the programmable 0.64 V to 5.25 V span")]
pub struct VoltageOutOfRange;

impl<E, P> From<VoltageOutOfRange> for Error<E, P> {
    fn from(_: VoltageOutOfRange) -> Self {
        Error::OutOfRange
    }
}
