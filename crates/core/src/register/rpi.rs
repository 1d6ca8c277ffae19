//! Raspberry Pi GPIO through `rppal`.

use std::collections::HashMap;

use rppal::gpio::{Gpio, OutputPin};

use super::pins::{Level, PinController, PinOp, ProtocolError};

pub struct RppalController {
    gpio: Gpio,
    lines: HashMap<u8, OutputPin>,
}

impl RppalController {
    pub fn new() -> Result<Self, ProtocolError> {
        let gpio = Gpio::new().map_err(|e| ProtocolError::pin(0, PinOp::Open, e))?;
        Ok(Self {
            gpio,
            lines: HashMap::new(),
        })
    }
}

impl PinController for RppalController {
    fn open_output(&mut self, pin: u8) -> Result<(), ProtocolError> {
        let line = self
            .gpio
            .get(pin)
            .map_err(|e| ProtocolError::pin(pin, PinOp::Open, e))?
            .into_output();
        self.lines.insert(pin, line);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), ProtocolError> {
        let line = self
            .lines
            .get_mut(&pin)
            .ok_or_else(|| ProtocolError::pin(pin, PinOp::Write, "pin not open"))?;
        match level {
            Level::High => line.set_high(),
            Level::Low => line.set_low(),
        }
        Ok(())
    }

    fn release(&mut self, pin: u8) -> Result<(), ProtocolError> {
        // Dropping the line restores its previous mode.
        self.lines
            .remove(&pin)
            .map(drop)
            .ok_or_else(|| ProtocolError::pin(pin, PinOp::Release, "pin not open"))
    }
}
