use crate::engine::{CompletionSender, EngineCore};
use crate::types::{DrawMode, DrawNumber, EngineState, WinnerSet};
use std::time::Duration;
use tokio::sync::watch;

const SEARCH_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPhase {
    #[default]
    Idle,
    Searching,
    Found,
}

#[derive(Debug, Default)]
struct Graph {
    phase: SearchPhase,
    highlighted: Vec<DrawNumber>,
}

/// Scans the participant graph and lights up the winning nodes at once.
#[derive(Clone)]
pub struct NodeSearchEngine {
    core: EngineCore<Graph>,
    winner_limit: usize,
}

impl NodeSearchEngine {
    pub fn new(winner_limit: usize, completions: CompletionSender) -> Self {
        Self {
            core: EngineCore::new(DrawMode::NodeSearch, winner_limit, completions),
            winner_limit,
        }
    }

    pub fn winner_limit(&self) -> usize {
        self.winner_limit
    }

    pub fn start(&self) -> bool {
        self.core.start(|graph| graph.phase = SearchPhase::Searching)
    }

    pub fn apply_result(&self, winners: &WinnerSet) -> bool {
        let Some((epoch, winners)) = self.core.begin_reveal(winners, |_, _| {}) else {
            return false;
        };

        let found: Vec<DrawNumber> = winners.iter().copied().collect();
        self.core.schedule_settle(SEARCH_DURATION, epoch, move |graph| {
            graph.phase = SearchPhase::Found;
            graph.highlighted = found;
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

    pub fn phase(&self) -> SearchPhase {
        self.core.view(|graph| graph.phase)
    }

    pub fn highlighted(&self) -> Vec<DrawNumber> {
        self.core.view(|graph| graph.highlighted.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_search_highlights_winners_on_settle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = NodeSearchEngine::new(3, tx);

        assert_eq!(engine.phase(), SearchPhase::Idle);
        engine.start();
        assert_eq!(engine.phase(), SearchPhase::Searching);

        engine.apply_result(&WinnerSet::from_numbers(&[11, 22]).unwrap());
        sleep(Duration::from_millis(1900)).await;
        assert!(engine.highlighted().is_empty());
        assert_eq!(engine.current_state(), EngineState::Revealing);

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.winners.numbers(), vec![11, 22]);
        assert_eq!(engine.phase(), SearchPhase::Found);
        assert_eq!(
            engine.highlighted(),
            completion.winners.iter().copied().collect::<Vec<_>>()
        );
    }
}
