//! Animation engines.
//!
//! Every draw mode implements the same lifecycle:
//!
//! ```text
//! idle --start()--> armed --apply_result()--> revealing --(timers)--> settled
//!   ^                                                                    |
//!   +----------------------------- reset() ------------------------------+
//! ```
//!
//! Transitions requested from the wrong state are ignored. A reveal ends in
//! exactly one [`DrawCompletion`] on the channel handed to the engine, unless
//! `reset()` runs first.

pub mod card_reveal;
pub mod digit_roll;
pub mod node_search;

pub use card_reveal::{Card, CardRevealEngine};
pub use digit_roll::DigitRollEngine;
pub use node_search::{NodeSearchEngine, SearchPhase};

use crate::error::Result;
use crate::types::{DrawMode, EngineState, WinnerSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Emitted once when a reveal settles. `winners` is in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCompletion {
    /// [`AnimationEngine::id`] of the engine that settled.
    pub engine_id: u64,
    pub mode: DrawMode,
    pub winners: WinnerSet,
}

pub type CompletionSender = mpsc::UnboundedSender<DrawCompletion>;

struct Shared<V> {
    state: EngineState,
    epoch: u64,
    winners: WinnerSet,
    view: V,
    timers: Vec<JoinHandle<()>>,
}

/// State machine and timer bookkeeping shared by all modes. `V` is the
/// mode's visible progress.
pub(crate) struct EngineCore<V> {
    id: u64,
    mode: DrawMode,
    winner_limit: usize,
    shared: Arc<Mutex<Shared<V>>>,
    state_tx: Arc<watch::Sender<EngineState>>,
    completions: CompletionSender,
}

impl<V> Clone for EngineCore<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            mode: self.mode,
            winner_limit: self.winner_limit,
            shared: self.shared.clone(),
            state_tx: self.state_tx.clone(),
            completions: self.completions.clone(),
        }
    }
}

impl<V: Default + Send + 'static> EngineCore<V> {
    pub(crate) fn new(mode: DrawMode, winner_limit: usize, completions: CompletionSender) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Idle);
        Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            mode,
            winner_limit,
            shared: Arc::new(Mutex::new(Shared {
                state: EngineState::Idle,
                epoch: 0,
                winners: WinnerSet::default(),
                view: V::default(),
                timers: Vec::new(),
            })),
            state_tx: Arc::new(state_tx),
            completions,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> EngineState {
        self.shared.lock().state
    }

    pub(crate) fn winners(&self) -> WinnerSet {
        self.shared.lock().winners.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn view<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.shared.lock().view)
    }

    fn transition(&self, shared: &mut Shared<V>, next: EngineState) {
        debug!("{} engine {} -> {}", self.mode, shared.state, next);
        shared.state = next;
        self.state_tx.send_replace(next);
    }

    /// idle -> armed. `prepare` sets up the suspense view.
    pub(crate) fn start(&self, prepare: impl FnOnce(&mut V)) -> bool {
        let mut shared = self.shared.lock();
        if shared.state != EngineState::Idle {
            warn!("Ignoring start on {} engine in state {}", self.mode, shared.state);
            return false;
        }
        prepare(&mut shared.view);
        self.transition(&mut shared, EngineState::Armed);
        info!("{} engine armed", self.mode);
        true
    }

    /// armed -> revealing. Returns the reveal epoch and the winners cut to the
    /// engine's limit, or `None` when the transition is not allowed.
    pub(crate) fn begin_reveal(
        &self,
        winners: &WinnerSet,
        prepare: impl FnOnce(&mut V, &WinnerSet),
    ) -> Option<(u64, WinnerSet)> {
        let mut shared = self.shared.lock();
        if shared.state != EngineState::Armed {
            warn!(
                "Ignoring result on {} engine in state {}",
                self.mode, shared.state
            );
            return None;
        }
        if winners.is_empty() {
            warn!("Ignoring empty result on {} engine", self.mode);
            return None;
        }

        if winners.len() > self.winner_limit {
            warn!(
                "{} engine shows {} winner(s), dropping {:?}",
                self.mode,
                self.winner_limit,
                &winners.numbers()[self.winner_limit..]
            );
        }
        let winners = winners.truncated(self.winner_limit);
        shared.winners = winners.clone();
        prepare(&mut shared.view, &winners);
        self.transition(&mut shared, EngineState::Revealing);
        info!("{} engine revealing {:?}", self.mode, winners.numbers());
        Some((shared.epoch, winners))
    }

    /// Runs `step` on the view after `delay`, unless the reveal was reset.
    pub(crate) fn schedule(
        &self,
        delay: Duration,
        epoch: u64,
        step: impl FnOnce(&mut V) + Send + 'static,
    ) {
        let core = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut shared = core.shared.lock();
            if shared.epoch == epoch && shared.state == EngineState::Revealing {
                step(&mut shared.view);
            }
        });
        self.track(handle);
    }

    /// Settles the reveal after `delay` and emits its completion.
    pub(crate) fn schedule_settle(
        &self,
        delay: Duration,
        epoch: u64,
        finish: impl FnOnce(&mut V) + Send + 'static,
    ) {
        let core = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let completion = {
                let mut shared = core.shared.lock();
                if shared.epoch != epoch || shared.state != EngineState::Revealing {
                    return;
                }
                finish(&mut shared.view);
                core.transition(&mut shared, EngineState::Settled);
                DrawCompletion {
                    engine_id: core.id,
                    mode: core.mode,
                    winners: shared.winners.clone(),
                }
            };
            info!("{} engine settled on {:?}", core.mode, completion.winners.numbers());
            if core.completions.send(completion).is_err() {
                warn!("Draw completion dropped; no receiver");
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut shared = self.shared.lock();
        shared.timers.retain(|t| !t.is_finished());
        shared.timers.push(handle);
    }

    /// Any state -> idle; cancels pending timers and clears the view.
    pub(crate) fn reset(&self) {
        let mut shared = self.shared.lock();
        shared.epoch += 1;
        for timer in shared.timers.drain(..) {
            timer.abort();
        }
        shared.winners = WinnerSet::default();
        shared.view = V::default();
        if shared.state != EngineState::Idle {
            self.transition(&mut shared, EngineState::Idle);
            info!("{} engine reset", self.mode);
        }
    }
}

/// Engine for one draw mode, chosen when the draw starts.
#[derive(Clone)]
pub enum AnimationEngine {
    DigitRoll(DigitRollEngine),
    CardReveal(CardRevealEngine),
    NodeSearch(NodeSearchEngine),
}

impl AnimationEngine {
    /// Fails with `InvalidWinnerCount` when the mode cannot show
    /// `winner_count` winners.
    pub fn for_mode(mode: DrawMode, winner_count: u32, completions: CompletionSender) -> Result<Self> {
        mode.validate_winner_count(winner_count)?;
        let engine = match mode {
            DrawMode::DigitRoll => Self::DigitRoll(DigitRollEngine::new(completions)),
            DrawMode::CardReveal => {
                Self::CardReveal(CardRevealEngine::new(winner_count as usize, completions))
            }
            DrawMode::NodeSearch => {
                Self::NodeSearch(NodeSearchEngine::new(winner_count as usize, completions))
            }
        };
        Ok(engine)
    }

    pub fn mode(&self) -> DrawMode {
        match self {
            Self::DigitRoll(_) => DrawMode::DigitRoll,
            Self::CardReveal(_) => DrawMode::CardReveal,
            Self::NodeSearch(_) => DrawMode::NodeSearch,
        }
    }

    /// Identity of this engine instance; clones share it.
    pub fn id(&self) -> u64 {
        match self {
            Self::DigitRoll(e) => e.id(),
            Self::CardReveal(e) => e.id(),
            Self::NodeSearch(e) => e.id(),
        }
    }

    pub fn winner_limit(&self) -> usize {
        match self {
            Self::DigitRoll(_) => 1,
            Self::CardReveal(e) => e.winner_limit(),
            Self::NodeSearch(e) => e.winner_limit(),
        }
    }

    pub fn start(&self) -> bool {
        match self {
            Self::DigitRoll(e) => e.start(),
            Self::CardReveal(e) => e.start(),
            Self::NodeSearch(e) => e.start(),
        }
    }

    pub fn apply_result(&self, winners: &WinnerSet) -> bool {
        match self {
            Self::DigitRoll(e) => e.apply_result(winners),
            Self::CardReveal(e) => e.apply_result(winners),
            Self::NodeSearch(e) => e.apply_result(winners),
        }
    }

    pub fn reset(&self) {
        match self {
            Self::DigitRoll(e) => e.reset(),
            Self::CardReveal(e) => e.reset(),
            Self::NodeSearch(e) => e.reset(),
        }
    }

    pub fn current_state(&self) -> EngineState {
        match self {
            Self::DigitRoll(e) => e.current_state(),
            Self::CardReveal(e) => e.current_state(),
            Self::NodeSearch(e) => e.current_state(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        match self {
            Self::DigitRoll(e) => e.subscribe_state(),
            Self::CardReveal(e) => e.subscribe_state(),
            Self::NodeSearch(e) => e.subscribe_state(),
        }
    }

    /// Winners of the current reveal, empty until `apply_result`.
    pub fn winners(&self) -> WinnerSet {
        match self {
            Self::DigitRoll(e) => e.winners(),
            Self::CardReveal(e) => e.winners(),
            Self::NodeSearch(e) => e.winners(),
        }
    }
}

impl std::fmt::Debug for AnimationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationEngine")
            .field("mode", &self.mode())
            .field("state", &self.current_state())
            .finish()
    }
}
