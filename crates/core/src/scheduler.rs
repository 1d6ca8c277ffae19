use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::register::{PinController, ProtocolError, RegisterDriver};
use crate::show::{Show, ShowPayload, ShowSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowReport {
    pub id: i32,
    pub name: String,
    pub writes: usize,
}

/// Plays shows on an open register.
///
/// Runs block the calling thread for the full show. Static shows wait `speed_ms` after every
/// byte, dynamic shows write back to back with only the pulse timing between bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowScheduler;

impl ShowScheduler {
    pub fn new() -> Self {
        Self
    }

    pub fn run_show<P, D>(
        &self,
        register: &mut RegisterDriver<P, D>,
        show: &Show,
    ) -> Result<ShowReport, ProtocolError>
    where
        P: PinController,
        D: DelayNs,
    {
        let mut writes = 0;

        match &show.payload {
            ShowPayload::Static { bytes } => {
                log::info!(
                    "Running static show {} with {} patterns at {}ms",
                    show.name,
                    bytes.len(),
                    show.speed_ms
                );
                let speed = Duration::from_millis(show.speed_ms);
                for _ in 0..show.iterations {
                    for byte in bytes {
                        register.write_register(*byte)?;
                        register.hold(speed);
                        writes += 1;
                    }
                }
            }
            ShowPayload::Dynamic { range } => {
                log::info!(
                    "Running dynamic show {} with start {} and end {} step {}",
                    show.name,
                    range.start,
                    range.end,
                    range.step
                );
                for _ in 0..show.iterations {
                    for value in range.values() {
                        register.write_register(value)?;
                        writes += 1;
                    }
                }
            }
        }

        Ok(ShowReport {
            id: show.id,
            name: show.name.clone(),
            writes,
        })
    }

    /// Run every show in order, stopping at the first pin failure.
    pub fn run_all<P, D>(
        &self,
        register: &mut RegisterDriver<P, D>,
        shows: &ShowSet,
    ) -> Result<Vec<ShowReport>, ProtocolError>
    where
        P: PinController,
        D: DelayNs,
    {
        shows
            .iter()
            .map(|show| self.run_show(register, show))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{
        BoardOp, PinConfig, PulseTiming, SimulatedBoard, SimulatedDelay, SimulatedPins,
    };
    use crate::show::DynamicRange;

    fn open_register(board: &SimulatedBoard) -> RegisterDriver<SimulatedPins, SimulatedDelay> {
        let mut register = RegisterDriver::new(
            board.pins(),
            board.delay(),
            PinConfig::default(),
            PulseTiming::default(),
        );
        register.open().unwrap();
        board.clear_ops();
        register
    }

    #[test]
    fn test_static_show_repeats_in_order() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut register = open_register(&board);
        let show = Show::new_static(1, "Steps", 3, 0, vec![1, 2, 4, 8]);

        let report = ShowScheduler::new().run_show(&mut register, &show).unwrap();

        assert_eq!(report.writes, 12);
        assert_eq!(board.latched(), [1u8, 2, 4, 8].repeat(3));
    }

    #[test]
    fn test_static_speed_follows_each_write() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut register = open_register(&board);
        let show = Show::new_static(1, "Flash", 2, 5, vec![0x00, 0xFF]);

        ShowScheduler::new().run_show(&mut register, &show).unwrap();

        assert_eq!(board.latched(), vec![0x00, 0xFF, 0x00, 0xFF]);

        // Each latch pulse ends with its low hold, then the show delay follows.
        let latch = PinConfig::default().latch;
        let ops = board.ops();
        let gaps: Vec<BoardOp> = ops
            .windows(3)
            .filter(|w| w[0] == BoardOp::Write(latch, crate::register::Level::Low))
            .map(|w| w[2])
            .collect();
        assert_eq!(gaps, vec![BoardOp::Delay(Duration::from_millis(5)); 4]);
    }

    #[test]
    fn test_dynamic_show_has_no_speed_delay() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut register = open_register(&board);
        let show = Show::new_dynamic(2, "Ramp", 1, 500, DynamicRange::new(0, 9, 3));

        let report = ShowScheduler::new().run_show(&mut register, &show).unwrap();

        assert_eq!(report.writes, 4);
        assert_eq!(board.latched(), vec![0, 3, 6, 9]);
        assert!(board
            .delays()
            .iter()
            .all(|d| *d == Duration::from_millis(1)));
    }

    #[test]
    fn test_dynamic_show_wraps_through_zero() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut register = open_register(&board);
        let show = Show::new_dynamic(4, "Wrap", 2, 0, DynamicRange::new(250, 260, 2));

        let report = ShowScheduler::new().run_show(&mut register, &show).unwrap();

        assert_eq!(report.writes, 12);
        assert_eq!(board.latched(), [250u8, 252, 254, 0, 2, 4].repeat(2));
    }

    #[test]
    fn test_no_op_shows() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut register = open_register(&board);
        let shows = ShowSet::from(vec![
            Show::new_static(1, "Empty", 5, 10, vec![]),
            Show::new_static(2, "Zero", 0, 10, vec![1, 2]),
            Show::new_dynamic(3, "Inverted", 4, 0, DynamicRange::new(10, 0, 1)),
        ]);

        let reports = ShowScheduler::new().run_all(&mut register, &shows).unwrap();

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.writes == 0));
        assert!(board.ops().is_empty());
    }

    #[test]
    fn test_run_all_stops_on_pin_failure() {
        let board = SimulatedBoard::new(PinConfig::default());
        let mut register = open_register(&board);
        board.fail_writes_after(60);
        let shows = ShowSet::from(vec![
            Show::new_static(1, "A", 1, 0, vec![1, 2, 3]),
            Show::new_static(2, "B", 1, 0, vec![4]),
        ]);

        let result = ShowScheduler::new().run_all(&mut register, &shows);

        assert!(result.is_err());
        // 26 pin writes per byte: two full bytes fit before the fault.
        assert_eq!(board.latched(), vec![1, 2]);
    }
}
