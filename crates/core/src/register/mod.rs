pub mod driver;
pub mod pins;
#[cfg(feature = "rpi")]
pub mod rpi;
pub mod sim;

pub use driver::{
    PulseTiming, RegisterDriver, RegisterSession, StdDelay, CLEAR_HOLD_FACTOR, DEFAULT_PULSE_UNIT,
    MIN_PULSE_UNIT,
};
pub use pins::{Level, PinConfig, PinController, PinOp, PinRole, ProtocolError};
#[cfg(feature = "rpi")]
pub use rpi::RppalController;
pub use sim::{BoardOp, SimulatedBoard, SimulatedDelay, SimulatedPins};
