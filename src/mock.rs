//! We use this mocking module in unit tests to emulate the I2C bus, the
//! rail enable lines and the delay provider.
//!
//! The mock bus is cheaply cloneable with shared interior state so that
//! several drivers (mux, converters, meters) can observe one transaction
//! log, the way they share one physical bus on the bench.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin, StatefulOutputPin};
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBusError {
    /// Simulated missing/NACKing device.
    NoAcknowledge,
    /// Read requested but no data was queued and no default set.
    NoDataQueued,
    /// Generic simulated error for testing.
    Simulated,
}

impl i2c::Error for MockBusError {
    fn kind(&self) -> ErrorKind {
        match self {
            MockBusError::NoAcknowledge => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            MockBusError::NoDataQueued => ErrorKind::Other,
            MockBusError::Simulated => ErrorKind::Other,
        }
    }
}

#[derive(Default)]
struct BusState {
    /// Every write operation that reached the bus, as (address, payload).
    written: Vec<(u8, Vec<u8>)>,
    /// Pre-configured responses, consumed one per read operation.
    reads: VecDeque<Vec<u8>>,
    /// Fallback response once the queue is empty.
    default_read: Option<Vec<u8>>,
    /// Flags to simulate failures.
    fail_all_writes: bool,
    fail_all_reads: bool,
    fail_writes_addr: Option<u8>,
    fail_reads_addr: Option<u8>,
    /// Fail writes to an address only after this many succeeded.
    fail_writes_after: Option<(u8, usize)>,
}

/// Our mock type used to emulate the shared I2C bus.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the payload returned by the next read operation.
    pub fn push_read(&self, data: &[u8]) {
        self.state.borrow_mut().reads.push_back(data.to_vec());
    }

    /// Payload returned by read operations once the queue is drained.
    pub fn set_default_read(&self, data: &[u8]) {
        self.state.borrow_mut().default_read = Some(data.to_vec());
    }

    /// Every write operation so far, as (address, payload) in bus order.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.borrow().written.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().written.clear();
    }

    pub fn set_write_error(&self, fail: bool) {
        self.state.borrow_mut().fail_all_writes = fail;
    }

    pub fn set_read_error(&self, fail: bool) {
        self.state.borrow_mut().fail_all_reads = fail;
    }

    /// Fail every write addressed to one device.
    pub fn fail_writes_at(&self, address: u8) {
        self.state.borrow_mut().fail_writes_addr = Some(address);
    }

    /// Fail every read addressed to one device.
    pub fn fail_reads_at(&self, address: u8) {
        self.state.borrow_mut().fail_reads_addr = Some(address);
    }

    /// Let `successes` writes to `address` through, fail the rest.
    pub fn fail_writes_at_after(&self, address: u8, successes: usize) {
        self.state.borrow_mut().fail_writes_after = Some((address, successes));
    }
}

impl ErrorType for MockBus {
    type Error = MockBusError;
}

impl I2c for MockBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    if state.fail_all_writes || state.fail_writes_addr == Some(address) {
                        return Err(MockBusError::NoAcknowledge);
                    }
                    if let Some((addr, remaining)) = &mut state.fail_writes_after {
                        if *addr == address {
                            if *remaining == 0 {
                                return Err(MockBusError::NoAcknowledge);
                            }
                            *remaining -= 1;
                        }
                    }
                    state.written.push((address, bytes.to_vec()));
                }
                Operation::Read(buffer) => {
                    if state.fail_all_reads || state.fail_reads_addr == Some(address) {
                        return Err(MockBusError::NoAcknowledge);
                    }
                    let data = match state.reads.pop_front() {
                        Some(data) => data,
                        None => state
                            .default_read
                            .clone()
                            .ok_or(MockBusError::NoDataQueued)?,
                    };
                    for (slot, value) in buffer.iter_mut().zip(data) {
                        *slot = value;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPinError;

impl digital::Error for MockPinError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

#[derive(Default)]
struct PinState {
    level: bool,
    history: Vec<bool>,
    fail: bool,
}

/// Our mock type used to emulate a rail's enable line.
#[derive(Clone, Default)]
pub struct MockPin {
    state: Rc<RefCell<PinState>>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current line level.
    pub fn is_high(&self) -> bool {
        self.state.borrow().level
    }

    /// Every level driven through the `OutputPin` trait, in order.
    pub fn levels(&self) -> Vec<bool> {
        self.state.borrow().history.clone()
    }

    /// Configure whether pin operations should fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.borrow_mut().fail = fail;
    }

    /// Set the level directly, without recording a driver write.
    pub fn force_level(&self, level: bool) {
        self.state.borrow_mut().level = level;
    }

    /// Forget the recorded history, keeping the current level.
    pub fn clear(&self) {
        self.state.borrow_mut().history.clear();
    }

    fn drive(&mut self, level: bool) -> Result<(), MockPinError> {
        let mut state = self.state.borrow_mut();
        if state.fail {
            return Err(MockPinError);
        }
        state.level = level;
        state.history.push(level);
        Ok(())
    }
}

impl digital::ErrorType for MockPin {
    type Error = MockPinError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

impl StatefulOutputPin for MockPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        let state = self.state.borrow();
        if state.fail {
            return Err(MockPinError);
        }
        Ok(state.level)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        self.is_set_high().map(|high| !high)
    }
}

/// Our mock delay provider; it records instead of sleeping so the poll
/// cadence of timeout loops can be asserted.
#[derive(Clone, Default)]
pub struct MockDelay {
    sleeps_ns: Rc<RefCell<Vec<u64>>>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded sleeps, rounded to whole milliseconds.
    pub fn sleeps_ms(&self) -> Vec<u32> {
        self.sleeps_ns
            .borrow()
            .iter()
            .map(|ns| (ns / 1_000_000) as u32)
            .collect()
    }

    pub fn clear(&self) {
        self.sleeps_ns.borrow_mut().clear();
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.sleeps_ns.borrow_mut().push(u64::from(ns));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_operations_are_logged_per_address() {
        let mut bus = MockBus::new();
        bus.write(0x10, &[0xAA, 0xBB]).unwrap();
        bus.write(0x20, &[0xCC]).unwrap();

        assert_eq!(bus.writes(), vec![
            (0x10, vec![0xAA, 0xBB]),
            (0x20, vec![0xCC]),
        ]);
    }

    #[test]
    fn reads_consume_the_queue_then_the_default() {
        let mut bus = MockBus::new();
        bus.push_read(&[0x01]);
        bus.set_default_read(&[0xFF]);

        let mut buf = [0u8; 1];
        bus.read(0x10, &mut buf).unwrap();
        assert_eq!(buf, [0x01]);
        bus.read(0x10, &mut buf).unwrap();
        assert_eq!(buf, [0xFF]);
    }

    #[test]
    fn read_without_data_fails() {
        let mut bus = MockBus::new();
        let mut buf = [0u8; 1];
        assert_eq!(bus.read(0x10, &mut buf), Err(MockBusError::NoDataQueued));
    }

    #[test]
    fn write_read_logs_the_write_and_serves_the_read() {
        let mut bus = MockBus::new();
        bus.push_read(&[0x55, 0x66]);

        let mut buf = [0u8; 2];
        bus.write_read(0x40, &[0x02], &mut buf).unwrap();
        assert_eq!(buf, [0x55, 0x66]);
        assert_eq!(bus.writes(), vec![(0x40, vec![0x02])]);
    }

    #[test]
    fn targeted_write_failures_only_hit_their_address() {
        let mut bus = MockBus::new();
        bus.fail_writes_at(0x70);

        assert_eq!(bus.write(0x70, &[0x01]), Err(MockBusError::NoAcknowledge));
        bus.write(0x50, &[0x01]).unwrap();
        assert_eq!(bus.writes().len(), 1);
    }

    #[test]
    fn deferred_write_failures_count_successes_first() {
        let mut bus = MockBus::new();
        bus.fail_writes_at_after(0x70, 1);

        bus.write(0x70, &[0x01]).unwrap();
        assert_eq!(bus.write(0x70, &[0x00]), Err(MockBusError::NoAcknowledge));
    }

    #[test]
    fn pin_records_driven_levels() {
        let mut pin = MockPin::new();
        pin.set_high().unwrap();
        pin.set_low().unwrap();

        assert!(!pin.is_high());
        assert_eq!(pin.levels(), vec![true, false]);
        assert_eq!(pin.is_set_low(), Ok(true));

        pin.set_fail(true);
        assert_eq!(pin.set_high(), Err(MockPinError));
        assert!(!pin.is_high());
    }

    #[test]
    fn delay_records_instead_of_sleeping() {
        let mut delay = MockDelay::new();
        delay.delay_ms(10);
        delay.delay_ms(10);
        assert_eq!(delay.sleeps_ms(), vec![10, 10]);
        delay.clear();
        assert!(delay.sleeps_ms().is_empty());
    }
}
