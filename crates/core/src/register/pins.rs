use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest BCM line exposed on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Physical header pin for each BCM line, indexed by BCM number.
const HEADER_PINS: [u8; 28] = [
    27, 28, 3, 5, 7, 29, 31, 26, 24, 21, 19, 23, 32, 33, 8, 10, 36, 11, 12, 35, 38, 40, 15, 16,
    18, 22, 37, 13,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    Open,
    Write,
    Release,
}

impl fmt::Display for PinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinOp::Open => write!(f, "open"),
            PinOp::Write => write!(f, "write"),
            PinOp::Release => write!(f, "release"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("GPIO{pin} {op} failed: {reason}")]
    Pin { pin: u8, op: PinOp, reason: String },

    #[error("register pins are not open")]
    NotOpen,

    #[error("invalid pulse timing: {0}")]
    Timing(String),
}

impl ProtocolError {
    pub fn pin(pin: u8, op: PinOp, reason: impl fmt::Display) -> Self {
        ProtocolError::Pin {
            pin,
            op,
            reason: reason.to_string(),
        }
    }
}

/// Digital output lines addressed by BCM number.
///
/// Implementations own the physical lines; the register driver only ever asks for the five
/// lines in its [`PinConfig`].
pub trait PinController: Send {
    fn open_output(&mut self, pin: u8) -> Result<(), ProtocolError>;

    fn write(&mut self, pin: u8, level: Level) -> Result<(), ProtocolError>;

    fn release(&mut self, pin: u8) -> Result<(), ProtocolError>;
}

impl<T: PinController + ?Sized> PinController for Box<T> {
    fn open_output(&mut self, pin: u8) -> Result<(), ProtocolError> {
        (**self).open_output(pin)
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), ProtocolError> {
        (**self).write(pin, level)
    }

    fn release(&mut self, pin: u8) -> Result<(), ProtocolError> {
        (**self).release(pin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    Data,
    OutputEnable,
    Latch,
    Clock,
    Clear,
}

impl PinRole {
    pub const ALL: [PinRole; 5] = [
        PinRole::Data,
        PinRole::OutputEnable,
        PinRole::Latch,
        PinRole::Clock,
        PinRole::Clear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PinRole::Data => "data",
            PinRole::OutputEnable => "out",
            PinRole::Latch => "stclock",
            PinRole::Clock => "shclock",
            PinRole::Clear => "clear",
        }
    }

    /// Name of the 74HC595 input this line is wired to.
    pub fn register_input(&self) -> &'static str {
        match self {
            PinRole::Data => "DS / SER",
            PinRole::OutputEnable => "OE",
            PinRole::Latch => "ST_CP",
            PinRole::Clock => "SH_CP",
            PinRole::Clear => "MR",
        }
    }
}

/// Wiring between the GPIO header and the shift register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    pub data: u8,
    pub output_enable: u8,
    pub latch: u8,
    pub clock: u8,
    pub clear: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            data: 14,
            output_enable: 15,
            latch: 18,
            clock: 23,
            clear: 24,
        }
    }
}

impl PinConfig {
    pub fn pin(&self, role: PinRole) -> u8 {
        match role {
            PinRole::Data => self.data,
            PinRole::OutputEnable => self.output_enable,
            PinRole::Latch => self.latch,
            PinRole::Clock => self.clock,
            PinRole::Clear => self.clear,
        }
    }

    pub fn assignments(&self) -> [(PinRole, u8); 5] {
        PinRole::ALL.map(|role| (role, self.pin(role)))
    }

    pub fn role_of(&self, pin: u8) -> Option<PinRole> {
        PinRole::ALL.into_iter().find(|role| self.pin(*role) == pin)
    }

    /// One wiring line per role, e.g. `data = GPIO14 = PIN08 = Register DS / SER`.
    pub fn describe(&self) -> Vec<String> {
        self.assignments()
            .iter()
            .map(|(role, pin)| {
                let header = header_pin(*pin)
                    .map(|p| format!("PIN{:02}", p))
                    .unwrap_or_else(|| "PIN??".to_string());
                format!(
                    "{:<7} = GPIO{:02} = {} = Register {}",
                    role.label(),
                    pin,
                    header,
                    role.register_input()
                )
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let assignments = self.assignments();

        for (role, pin) in &assignments {
            if *pin > MAX_BCM_PIN {
                errors.push(format!(
                    "{} pin GPIO{} is outside GPIO0-GPIO{}",
                    role.label(),
                    pin,
                    MAX_BCM_PIN
                ));
            }
        }

        for (i, (role, pin)) in assignments.iter().enumerate() {
            if let Some((other, _)) = assignments[..i].iter().find(|(_, p)| p == pin) {
                errors.push(format!(
                    "{} and {} are both wired to GPIO{}",
                    other.label(),
                    role.label(),
                    pin
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub fn header_pin(bcm: u8) -> Option<u8> {
    HEADER_PINS.get(bcm as usize).copied()
}
