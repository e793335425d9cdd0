//! Bridges "result already arrived" with "animation not ready yet".
//!
//! A result that arrives while the target engine is idle or settled on an
//! earlier draw is held as the single pending result. A background task applies it the moment the engine reports
//! `armed`: it reacts to the engine's state channel and also polls every
//! 100 ms. Results are deduplicated by draw session, not by content.

use crate::engine::AnimationEngine;
use crate::types::{EngineState, WinnerSet};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Applied to an armed engine right away.
    Applied,
    /// Held until the engine is armed.
    Buffered,
    /// This session's result was already applied or is already pending.
    Duplicate,
    /// The engine is mid-reveal and cannot take a result.
    Ignored,
}

#[derive(Debug, Clone)]
struct Pending {
    session: Option<String>,
    winners: WinnerSet,
}

#[derive(Default)]
struct Inner {
    target: Option<AnimationEngine>,
    pending: Option<Pending>,
    applied: HashSet<String>,
}

impl Inner {
    /// Applies the pending result if the target is armed. Returns `true` once
    /// nothing is left to wait for.
    fn try_apply(&mut self) -> bool {
        let Some(engine) = &self.target else {
            return self.pending.is_none();
        };
        if engine.current_state() != EngineState::Armed {
            return self.pending.is_none();
        }
        let Some(pending) = self.pending.take() else {
            return true;
        };

        if engine.apply_result(&pending.winners) {
            info!("Applied buffered result {:?}", pending.winners.numbers());
        }
        if let Some(session) = pending.session {
            self.applied.insert(session);
        }
        true
    }
}

pub struct Reconciler {
    inner: Arc<Mutex<Inner>>,
    retarget: Arc<Notify>,
    poll: Option<JoinHandle<()>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            retarget: Arc::new(Notify::new()),
            poll: None,
        }
    }

    /// Engine that future and pending results are applied to.
    pub fn attach(&self, engine: AnimationEngine) {
        self.inner.lock().target = Some(engine);
        self.retarget.notify_one();
    }

    /// Binds an unlabelled pending result to `session`, or drops a pending
    /// result that belongs to a different session.
    pub fn begin_session(&self, session: &str) {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.pending.as_mut() else {
            return;
        };
        match &pending.session {
            None => pending.session = Some(session.to_string()),
            Some(owner) if owner != session => {
                warn!("Discarding pending result for stale session {}", owner);
                inner.pending = None;
            }
            Some(_) => {}
        }
    }

    pub fn submit(&mut self, session: Option<&str>, winners: WinnerSet) -> Submission {
        let mut inner = self.inner.lock();

        if let Some(session) = session {
            let already_pending = inner
                .pending
                .as_ref()
                .is_some_and(|p| p.session.as_deref() == Some(session));
            if inner.applied.contains(session) || already_pending {
                debug!("Ignoring repeated result for session {}", session);
                return Submission::Duplicate;
            }
        }

        let state = inner
            .target
            .as_ref()
            .map(AnimationEngine::current_state)
            .unwrap_or(EngineState::Idle);

        match state {
            EngineState::Armed => {
                let applied = inner
                    .target
                    .as_ref()
                    .is_some_and(|engine| engine.apply_result(&winners));
                if !applied {
                    return Submission::Ignored;
                }
                if let Some(session) = session {
                    inner.applied.insert(session.to_string());
                }
                inner.pending = None;
                Submission::Applied
            }
            EngineState::Idle | EngineState::Settled => {
                if inner.pending.is_some() {
                    warn!("Replacing pending result");
                }
                info!("Buffering result {:?} until engine is armed", winners.numbers());
                inner.pending = Some(Pending {
                    session: session.map(str::to_string),
                    winners,
                });
                drop(inner);
                self.ensure_polling();
                Submission::Buffered
            }
            EngineState::Revealing => {
                warn!("Ignoring result for engine in state {}", state);
                Submission::Ignored
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn pending(&self) -> Option<WinnerSet> {
        self.inner.lock().pending.as_ref().map(|p| p.winners.clone())
    }

    /// Drops the pending result and stops polling.
    pub fn cancel(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        if self.inner.lock().pending.take().is_some() {
            debug!("Pending result cancelled");
        }
    }

    /// `cancel` plus forgetting which sessions were applied.
    pub fn reset(&mut self) {
        self.cancel();
        self.inner.lock().applied.clear();
    }

    fn ensure_polling(&mut self) {
        if self.poll.as_ref().is_some_and(|p| !p.is_finished()) {
            return;
        }

        let inner = self.inner.clone();
        let retarget = self.retarget.clone();
        self.poll = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            let mut state_rx = inner.lock().target.as_ref().map(|e| e.subscribe_state());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = retarget.notified() => {
                        state_rx = inner.lock().target.as_ref().map(|e| e.subscribe_state());
                    }
                    changed = async {
                        match state_rx.as_mut() {
                            Some(rx) => rx.changed().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        if changed.is_err() {
                            state_rx = None;
                        }
                    }
                }

                if inner.lock().try_apply() {
                    break;
                }
            }
        }));
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DrawMode;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    fn engine(mode: DrawMode, count: u32) -> (AnimationEngine, mpsc::UnboundedReceiver<crate::engine::DrawCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AnimationEngine::for_mode(mode, count, tx).unwrap(), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_before_start_applies_after_start() {
        let (engine, mut completions) = engine(DrawMode::CardReveal, 3);
        let mut reconciler = Reconciler::new();
        reconciler.attach(engine.clone());

        let winners = WinnerSet::from_numbers(&[42, 7, 190]).unwrap();
        assert_eq!(reconciler.submit(Some("draw-1"), winners.clone()), Submission::Buffered);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.current_state(), EngineState::Idle);

        engine.start();
        sleep(POLL_INTERVAL).await;
        assert_eq!(engine.current_state(), EngineState::Revealing);
        assert!(!reconciler.has_pending());

        assert_eq!(completions.recv().await.unwrap().winners, winners);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_is_applied_once_per_session() {
        let (engine, mut completions) = engine(DrawMode::DigitRoll, 1);
        let mut reconciler = Reconciler::new();
        reconciler.attach(engine.clone());
        let winners = WinnerSet::from_numbers(&[173]).unwrap();

        reconciler.submit(Some("draw-1"), winners.clone());
        assert_eq!(
            reconciler.submit(Some("draw-1"), winners.clone()),
            Submission::Duplicate
        );

        engine.start();
        completions.recv().await.unwrap();
        assert_eq!(
            reconciler.submit(Some("draw-1"), winners),
            Submission::Duplicate
        );
        sleep(Duration::from_secs(5)).await;
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_engine_applies_immediately() {
        let (engine, _completions) = engine(DrawMode::DigitRoll, 1);
        let mut reconciler = Reconciler::new();
        reconciler.attach(engine.clone());
        engine.start();

        let winners = WinnerSet::from_numbers(&[5]).unwrap();
        assert_eq!(reconciler.submit(None, winners.clone()), Submission::Applied);
        assert_eq!(reconciler.submit(None, winners), Submission::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_result() {
        let (engine, _completions) = engine(DrawMode::DigitRoll, 1);
        let mut reconciler = Reconciler::new();
        reconciler.attach(engine.clone());

        reconciler.submit(Some("draw-1"), WinnerSet::from_numbers(&[5]).unwrap());
        reconciler.reset();
        reconciler.reset();
        assert!(!reconciler.has_pending());

        engine.start();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.current_state(), EngineState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_for_next_session_is_held_while_settled() {
        let (next, mut next_completions) = engine(DrawMode::DigitRoll, 1);
        let (engine, mut completions) = engine(DrawMode::DigitRoll, 1);
        let mut reconciler = Reconciler::new();
        reconciler.attach(engine.clone());

        engine.start();
        reconciler.submit(Some("draw-1"), WinnerSet::from_numbers(&[1]).unwrap());
        completions.recv().await.unwrap();
        assert_eq!(engine.current_state(), EngineState::Settled);

        assert_eq!(
            reconciler.submit(Some("draw-1"), WinnerSet::from_numbers(&[1]).unwrap()),
            Submission::Duplicate
        );
        assert_eq!(
            reconciler.submit(Some("draw-2"), WinnerSet::from_numbers(&[2]).unwrap()),
            Submission::Buffered
        );

        reconciler.attach(next.clone());
        reconciler.begin_session("draw-2");
        next.start();
        assert_eq!(next_completions.recv().await.unwrap().winners.numbers(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_follows_reattached_engine() {
        let (old_engine, _old) = engine(DrawMode::DigitRoll, 1);
        let (new_engine, mut completions) = engine(DrawMode::CardReveal, 2);
        let mut reconciler = Reconciler::new();
        reconciler.attach(old_engine);

        reconciler.submit(None, WinnerSet::from_numbers(&[8, 9]).unwrap());
        reconciler.attach(new_engine.clone());
        reconciler.begin_session("draw-2");
        new_engine.start();

        assert_eq!(completions.recv().await.unwrap().winners.numbers(), vec![8, 9]);
        assert_eq!(
            reconciler.submit(Some("draw-2"), WinnerSet::from_numbers(&[8, 9]).unwrap()),
            Submission::Duplicate
        );
    }
}
