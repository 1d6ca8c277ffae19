//! In-memory board with a modelled shift register, for dry runs and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;

use super::pins::{Level, PinConfig, PinController, PinOp, PinRole, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOp {
    Open(u8),
    Write(u8, Level),
    Release(u8),
    Delay(Duration),
}

#[derive(Debug, Default)]
struct BoardState {
    ops: Vec<BoardOp>,
    levels: HashMap<u8, Level>,
    shift_stage: u8,
    latched: Vec<u8>,
    clocked: Vec<Level>,
    writes_left: Option<usize>,
    keep_history: bool,
}

impl BoardState {
    fn record(&mut self, op: BoardOp) {
        if self.keep_history {
            self.ops.push(op);
        }
    }
}

/// A simulated GPIO header wired to a 74HC595.
///
/// Cloning the board shares its state, so tests can keep a handle while the pins and delay
/// are owned by a [`RegisterDriver`](super::RegisterDriver). Delays are recorded, not slept.
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    config: PinConfig,
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    pub fn new(config: PinConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BoardState {
                keep_history: true,
                ..BoardState::default()
            })),
        }
    }

    /// A board that only tracks pin levels, for long dry runs. Outputs are logged but
    /// `ops`, `latched` and `clocked_data_levels` stay empty.
    pub fn without_history(config: PinConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BoardState::default())),
        }
    }

    pub fn pins(&self) -> SimulatedPins {
        SimulatedPins {
            board: self.clone(),
        }
    }

    pub fn delay(&self) -> SimulatedDelay {
        SimulatedDelay {
            board: self.clone(),
        }
    }

    pub fn ops(&self) -> Vec<BoardOp> {
        self.state.lock().ops.clone()
    }

    /// Forget recorded operations and decoded history. Pin levels are kept.
    pub fn clear_ops(&self) {
        let mut state = self.state.lock();
        state.ops.clear();
        state.latched.clear();
        state.clocked.clear();
    }

    /// Let `count` more writes succeed, then fail every write after that.
    pub fn fail_writes_after(&self, count: usize) {
        self.state.lock().writes_left = Some(count);
    }

    /// Bytes presented on the register outputs, one per latch pulse.
    pub fn latched(&self) -> Vec<u8> {
        self.state.lock().latched.clone()
    }

    /// Data line level sampled at each rising clock edge.
    pub fn clocked_data_levels(&self) -> Vec<Level> {
        self.state.lock().clocked.clone()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                BoardOp::Delay(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Rising edges seen on `pin`.
    pub fn pulse_count(&self, pin: u8) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| **op == BoardOp::Write(pin, Level::High))
            .count()
    }

    /// Times the clear line was asserted.
    pub fn clear_count(&self) -> usize {
        let clear = self.config.clear;
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| **op == BoardOp::Write(clear, Level::Low))
            .count()
    }

    pub fn open_pins(&self) -> usize {
        self.state.lock().levels.len()
    }
}

pub struct SimulatedPins {
    board: SimulatedBoard,
}

impl PinController for SimulatedPins {
    fn open_output(&mut self, pin: u8) -> Result<(), ProtocolError> {
        let mut state = self.board.state.lock();
        if state.levels.contains_key(&pin) {
            return Err(ProtocolError::pin(pin, PinOp::Open, "pin already open"));
        }
        state.levels.insert(pin, Level::Low);
        state.record(BoardOp::Open(pin));
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), ProtocolError> {
        let config = &self.board.config;
        let mut state = self.board.state.lock();

        if let Some(left) = state.writes_left.as_mut() {
            if *left == 0 {
                return Err(ProtocolError::pin(pin, PinOp::Write, "simulated fault"));
            }
            *left -= 1;
        }

        let previous = match state.levels.get(&pin) {
            Some(level) => *level,
            None => return Err(ProtocolError::pin(pin, PinOp::Write, "pin not open")),
        };
        state.levels.insert(pin, level);
        state.record(BoardOp::Write(pin, level));

        let rising = previous == Level::Low && level == Level::High;
        match config.role_of(pin) {
            Some(PinRole::Clock) if rising => {
                let data = state
                    .levels
                    .get(&config.data)
                    .copied()
                    .unwrap_or(Level::Low);
                if state.keep_history {
                    state.clocked.push(data);
                }
                state.shift_stage = (state.shift_stage << 1) | u8::from(data == Level::High);
            }
            Some(PinRole::Latch) if rising => {
                let value = state.shift_stage;
                if state.keep_history {
                    state.latched.push(value);
                }
                log::debug!("Register output {:08b}", value);
            }
            Some(PinRole::Clear) if level == Level::Low => {
                state.shift_stage = 0;
            }
            _ => {}
        }

        Ok(())
    }

    fn release(&mut self, pin: u8) -> Result<(), ProtocolError> {
        let mut state = self.board.state.lock();
        if state.levels.remove(&pin).is_none() {
            return Err(ProtocolError::pin(pin, PinOp::Release, "pin not open"));
        }
        state.record(BoardOp::Release(pin));
        Ok(())
    }
}

pub struct SimulatedDelay {
    board: SimulatedBoard,
}

impl DelayNs for SimulatedDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.board
            .state
            .lock()
            .record(BoardOp::Delay(Duration::from_nanos(ns.into())));
    }

    fn delay_us(&mut self, us: u32) {
        self.board
            .state
            .lock()
            .record(BoardOp::Delay(Duration::from_micros(us.into())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_model_shifts_and_latches() {
        let config = PinConfig::default();
        let board = SimulatedBoard::new(config.clone());
        let mut pins = board.pins();
        for (_, pin) in config.assignments() {
            pins.open_output(pin).unwrap();
        }

        for bit in [Level::High, Level::High, Level::Low] {
            pins.write(config.data, bit).unwrap();
            pins.write(config.clock, Level::High).unwrap();
            pins.write(config.clock, Level::Low).unwrap();
        }
        pins.write(config.latch, Level::High).unwrap();

        assert_eq!(board.latched(), vec![0b110]);
    }

    #[test]
    fn test_unopened_pin_rejected() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut pins = board.pins();
        assert!(matches!(
            pins.write(3, Level::High),
            Err(ProtocolError::Pin { pin: 3, op: PinOp::Write, .. })
        ));
        assert!(pins.release(3).is_err());
    }

    #[test]
    fn test_board_without_history_still_models_levels() {
        let config = PinConfig::default();
        let board = SimulatedBoard::without_history(config.clone());
        let mut pins = board.pins();
        pins.open_output(config.latch).unwrap();
        pins.write(config.latch, Level::High).unwrap();

        assert_eq!(board.open_pins(), 1);
        assert!(board.ops().is_empty());
        assert!(board.latched().is_empty());
    }
}
