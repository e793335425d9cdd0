use crate::engine::{CompletionSender, EngineCore};
use crate::types::{DrawMode, EngineState, WinnerSet};
use std::time::Duration;
use tokio::sync::watch;

const DIGITS: usize = 3;
const STOP_INTERVAL: Duration = Duration::from_millis(500);
const STOP_ANIMATION: Duration = Duration::from_millis(1500);

#[derive(Debug, Default, Clone)]
struct Reels {
    locked: [Option<u8>; DIGITS],
}

/// Three spinning reels that lock left to right onto a single winner.
#[derive(Clone)]
pub struct DigitRollEngine {
    core: EngineCore<Reels>,
}

impl DigitRollEngine {
    pub fn new(completions: CompletionSender) -> Self {
        Self {
            core: EngineCore::new(DrawMode::DigitRoll, 1, completions),
        }
    }

    pub fn start(&self) -> bool {
        self.core.start(|_| {})
    }

    /// Only the rank-1 winner is shown; extra ranks are dropped.
    pub fn apply_result(&self, winners: &WinnerSet) -> bool {
        let Some((epoch, winners)) = self.core.begin_reveal(winners, |_, _| {}) else {
            return false;
        };
        let Some(winner) = winners.first() else {
            return false;
        };

        for (index, digit) in winner.digits().into_iter().enumerate() {
            let at = STOP_INTERVAL * (index as u32 + 1);
            self.core
                .schedule(at, epoch, move |reels| reels.locked[index] = Some(digit));
        }
        self.core
            .schedule_settle(STOP_INTERVAL * DIGITS as u32 + STOP_ANIMATION, epoch, |_| {});
        true
    }

    pub fn reset(&self) {
        self.core.reset()
    }

    pub fn id(&self) -> u64 {
        self.core.id()
    }

    pub fn current_state(&self) -> EngineState {
        self.core.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.core.subscribe()
    }

    pub fn winners(&self) -> WinnerSet {
        self.core.winners()
    }

    /// Digits that have stopped so far, hundreds first.
    pub fn locked_digits(&self) -> [Option<u8>; DIGITS] {
        self.core.view(|reels| reels.locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_single_winner_settles_after_three_seconds() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = DigitRollEngine::new(tx);

        assert!(engine.start());
        assert_eq!(engine.current_state(), EngineState::Armed);
        let began = Instant::now();
        assert!(engine.apply_result(&WinnerSet::from_numbers(&[173]).unwrap()));
        assert_eq!(engine.current_state(), EngineState::Revealing);

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.mode, DrawMode::DigitRoll);
        assert_eq!(completion.winners.numbers(), vec![173]);
        assert_eq!(engine.current_state(), EngineState::Settled);
        assert!(began.elapsed() >= Duration::from_millis(3000));
        assert_eq!(engine.locked_digits(), [Some(1), Some(7), Some(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_digits_lock_left_to_right() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = DigitRollEngine::new(tx);
        engine.start();
        engine.apply_result(&WinnerSet::from_numbers(&[42]).unwrap());

        sleep(Duration::from_millis(501)).await;
        assert_eq!(engine.locked_digits(), [Some(0), None, None]);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.locked_digits(), [Some(0), Some(4), None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_ranks_are_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = DigitRollEngine::new(tx);
        engine.start();
        engine.apply_result(&WinnerSet::from_numbers(&[9, 8]).unwrap());

        assert_eq!(rx.recv().await.unwrap().winners.numbers(), vec![9]);
    }
}
