//! Bit-banged driver for a 74HC595-style serial-in/parallel-out register.
//!
//! Bytes are shifted in most significant bit first. Each bit is presented on the data line
//! and clocked in with one pulse on SH_CP; once all eight bits are in, a single pulse on
//! ST_CP copies the shift stage to the outputs. MR (clear) is active-low and held for
//! [`CLEAR_HOLD_FACTOR`] pulse units. OE is active-low and is driven low while the pins are
//! open so the outputs stay enabled.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use super::pins::{Level, PinConfig, PinController, PinRole, ProtocolError};

pub const DEFAULT_PULSE_UNIT: Duration = Duration::from_millis(1);

/// Shortest hold accepted for a clock or latch pulse. Well above the register's minimum
/// pulse width at 2V.
pub const MIN_PULSE_UNIT: Duration = Duration::from_micros(1);

pub const CLEAR_HOLD_FACTOR: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    unit: Duration,
}

impl PulseTiming {
    pub fn new(unit: Duration) -> Result<Self, ProtocolError> {
        if unit < MIN_PULSE_UNIT {
            return Err(ProtocolError::Timing(format!(
                "pulse unit {:?} is shorter than the {:?} minimum",
                unit, MIN_PULSE_UNIT
            )));
        }
        Ok(Self { unit })
    }

    pub fn from_micros(micros: u64) -> Result<Self, ProtocolError> {
        Self::new(Duration::from_micros(micros))
    }

    /// Hold time for each half of a clock or latch pulse.
    pub fn pulse_hold(&self) -> Duration {
        self.unit
    }

    pub fn clear_hold(&self) -> Duration {
        self.unit * CLEAR_HOLD_FACTOR
    }
}

impl Default for PulseTiming {
    fn default() -> Self {
        Self {
            unit: DEFAULT_PULSE_UNIT,
        }
    }
}

/// Delay backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us.into()));
    }
}

pub struct RegisterDriver<P: PinController, D: DelayNs> {
    pins: P,
    delay: D,
    config: PinConfig,
    timing: PulseTiming,
    opened: Vec<u8>,
}

impl<P: PinController, D: DelayNs> RegisterDriver<P, D> {
    pub fn new(pins: P, delay: D, config: PinConfig, timing: PulseTiming) -> Self {
        Self {
            pins,
            delay,
            config,
            timing,
            opened: Vec::new(),
        }
    }

    pub fn config(&self) -> &PinConfig {
        &self.config
    }

    pub fn timing(&self) -> PulseTiming {
        self.timing
    }

    pub fn is_open(&self) -> bool {
        self.opened.len() == PinRole::ALL.len()
    }

    /// Open all five lines as outputs and drive them to their idle levels.
    ///
    /// Lines opened before a failure are released again before the error is returned.
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        if self.is_open() {
            return Ok(());
        }

        log::info!("Setting up GPIO environment ...");
        for line in self.config.describe() {
            log::debug!("  {}", line);
        }

        if let Err(e) = self.open_lines() {
            self.release();
            return Err(e);
        }

        log::info!("Setup of GPIO environment complete");
        Ok(())
    }

    fn open_lines(&mut self) -> Result<(), ProtocolError> {
        for (_, pin) in self.config.assignments() {
            if !self.opened.contains(&pin) {
                self.pins.open_output(pin)?;
                self.opened.push(pin);
            }
        }

        self.set(PinRole::Data, Level::Low)?;
        self.set(PinRole::Latch, Level::Low)?;
        self.set(PinRole::Clock, Level::Low)?;
        self.set(PinRole::Clear, Level::High)?;
        self.set(PinRole::OutputEnable, Level::Low)
    }

    /// Release every opened line. Release failures are logged, never returned.
    pub fn release(&mut self) {
        if self.opened.is_empty() {
            return;
        }
        log::info!("Clean up GPIO");
        for pin in std::mem::take(&mut self.opened) {
            if let Err(e) = self.pins.release(pin) {
                log::warn!("{}", e);
            }
        }
    }

    /// Open the lines for the lifetime of the returned guard.
    pub fn session(&mut self) -> Result<RegisterSession<'_, P, D>, ProtocolError> {
        self.open()?;
        Ok(RegisterSession { driver: self })
    }

    pub fn write_register(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.ensure_open()?;

        let mut bits = value;
        for _ in 0..8 {
            let level = if bits & 0x80 == 0x80 {
                Level::High
            } else {
                Level::Low
            };
            self.set(PinRole::Data, level)?;
            self.pulse(PinRole::Clock)?;
            bits <<= 1;
        }

        self.pulse(PinRole::Latch)
    }

    pub fn clear_register(&mut self) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        log::debug!("Clearing register");

        self.set(PinRole::Clear, Level::Low)?;
        self.hold(self.timing.clear_hold());
        self.set(PinRole::Clear, Level::High)
    }

    /// Block for `duration` on the driver's delay source.
    pub fn hold(&mut self, duration: Duration) {
        let mut micros = duration.as_micros();
        while micros > 0 {
            let chunk = micros.min(u32::MAX as u128) as u32;
            self.delay.delay_us(chunk);
            micros -= chunk as u128;
        }
    }

    fn ensure_open(&self) -> Result<(), ProtocolError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ProtocolError::NotOpen)
        }
    }

    fn set(&mut self, role: PinRole, level: Level) -> Result<(), ProtocolError> {
        self.pins.write(self.config.pin(role), level)
    }

    fn pulse(&mut self, role: PinRole) -> Result<(), ProtocolError> {
        let hold = self.timing.pulse_hold();
        self.set(role, Level::High)?;
        self.hold(hold);
        self.set(role, Level::Low)?;
        self.hold(hold);
        Ok(())
    }
}

impl<P: PinController, D: DelayNs> Drop for RegisterDriver<P, D> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open register lines, released when dropped.
pub struct RegisterSession<'a, P: PinController, D: DelayNs> {
    driver: &'a mut RegisterDriver<P, D>,
}

impl<P: PinController, D: DelayNs> Deref for RegisterSession<'_, P, D> {
    type Target = RegisterDriver<P, D>;

    fn deref(&self) -> &Self::Target {
        self.driver
    }
}

impl<P: PinController, D: DelayNs> DerefMut for RegisterSession<'_, P, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.driver
    }
}

impl<P: PinController, D: DelayNs> Drop for RegisterSession<'_, P, D> {
    fn drop(&mut self) {
        self.driver.release();
    }
}
