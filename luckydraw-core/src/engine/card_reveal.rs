use crate::engine::{CompletionSender, EngineCore};
use crate::types::{DrawMode, DrawNumber, EngineState, WinnerSet};
use std::time::Duration;
use tokio::sync::watch;

const FIRST_FLIP: Duration = Duration::from_millis(500);
const FLIP_INTERVAL: Duration = Duration::from_millis(1000);
const SETTLE_PAUSE: Duration = Duration::from_millis(500);

/// One face-down card; `rank` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub rank: usize,
    pub draw_number: DrawNumber,
    pub flipped: bool,
}

#[derive(Debug, Default)]
struct Table {
    cards: Vec<Card>,
}

/// Deals one card per winner and flips them in rank order.
#[derive(Clone)]
pub struct CardRevealEngine {
    core: EngineCore<Table>,
    winner_limit: usize,
}

impl CardRevealEngine {
    pub fn new(winner_limit: usize, completions: CompletionSender) -> Self {
        Self {
            core: EngineCore::new(DrawMode::CardReveal, winner_limit, completions),
            winner_limit,
        }
    }

    pub fn winner_limit(&self) -> usize {
        self.winner_limit
    }

    pub fn start(&self) -> bool {
        self.core.start(|_| {})
    }

    pub fn apply_result(&self, winners: &WinnerSet) -> bool {
        let dealt = self.core.begin_reveal(winners, |table, winners| {
            table.cards = winners
                .iter()
                .enumerate()
                .map(|(index, &draw_number)| Card {
                    rank: index + 1,
                    draw_number,
                    flipped: false,
                })
                .collect();
        });
        let Some((epoch, winners)) = dealt else {
            return false;
        };

        for index in 0..winners.len() {
            let at = FIRST_FLIP + FLIP_INTERVAL * index as u32;
            self.core.schedule(at, epoch, move |table| {
                if let Some(card) = table.cards.get_mut(index) {
                    card.flipped = true;
                }
            });
        }

        let settle = FIRST_FLIP + FLIP_INTERVAL * winners.len() as u32 + SETTLE_PAUSE;
        self.core.schedule_settle(settle, epoch, |table| {
            for card in &mut table.cards {
                card.flipped = true;
            }
        });
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

    pub fn cards(&self) -> Vec<Card> {
        self.core.view(|table| table.cards.clone())
    }

    pub fn flipped_count(&self) -> usize {
        self.core
            .view(|table| table.cards.iter().filter(|c| c.flipped).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_cards_flip_in_rank_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = CardRevealEngine::new(3, tx);
        engine.start();
        let began = Instant::now();
        engine.apply_result(&WinnerSet::from_numbers(&[42, 7, 190]).unwrap());
        assert_eq!(engine.flipped_count(), 0);

        sleep(Duration::from_millis(600)).await;
        let cards = engine.cards();
        assert!(cards[0].flipped);
        assert!(!cards[1].flipped);
        assert_eq!(cards[2].rank, 3);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(engine.flipped_count(), 2);

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.winners.numbers(), vec![42, 7, 190]);
        assert!(began.elapsed() >= Duration::from_millis(500 + 3000 + 500));
        assert_eq!(engine.flipped_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_is_cut_to_winner_count() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = CardRevealEngine::new(2, tx);
        engine.start();
        engine.apply_result(&WinnerSet::from_numbers(&[1, 2, 3]).unwrap());

        assert_eq!(engine.cards().len(), 2);
        assert_eq!(rx.recv().await.unwrap().winners.numbers(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_table() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = CardRevealEngine::new(2, tx);
        engine.start();
        engine.apply_result(&WinnerSet::from_numbers(&[1, 2]).unwrap());
        engine.reset();

        sleep(Duration::from_secs(5)).await;
        assert!(engine.cards().is_empty());
        assert_eq!(engine.current_state(), EngineState::Idle);
    }
}
