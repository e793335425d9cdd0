//! "Next prize" overlay shown by a presentation surface.
//!
//! `hidden -> full-screen -> collapsed -> hidden`. A standby announcement
//! fills the screen, shrinks to a header badge after a short dwell, and gives
//! way to the engine when the draw starts.

use crate::engine::AnimationEngine;
use crate::types::StandbyAnnouncement;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COLLAPSE_AFTER: Duration = Duration::from_millis(2000);
const START_HOLD: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    FullScreen,
    Collapsed,
}

struct Inner {
    state: OverlayState,
    announcement: Option<StandbyAnnouncement>,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_timer(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Clone)]
pub struct StandbyPresenter {
    inner: Arc<Mutex<Inner>>,
    state_tx: Arc<watch::Sender<OverlayState>>,
}

impl Default for StandbyPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl StandbyPresenter {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(OverlayState::Hidden);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: OverlayState::Hidden,
                announcement: None,
                epoch: 0,
                timer: None,
            })),
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn state(&self) -> OverlayState {
        self.inner.lock().state
    }

    pub fn announcement(&self) -> Option<StandbyAnnouncement> {
        self.inner.lock().announcement.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OverlayState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, inner: &mut Inner, state: OverlayState) {
        if inner.state != state {
            debug!("Overlay {:?} -> {:?}", inner.state, state);
        }
        inner.state = state;
        if state == OverlayState::Hidden {
            inner.announcement = None;
        }
        self.state_tx.send_replace(state);
    }

    /// Shows the next prize full-screen and schedules the collapse.
    pub fn on_standby(&self, prize_name: &str, prize_image: Option<String>) {
        let mut inner = self.inner.lock();
        inner.cancel_timer();
        inner.announcement = Some(StandbyAnnouncement {
            prize_name: prize_name.to_string(),
            prize_image,
            is_next: true,
            collapsed_at: None,
        });
        self.set_state(&mut inner, OverlayState::FullScreen);
        info!("Standby announced: {}", prize_name);

        let epoch = inner.epoch;
        let presenter = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(COLLAPSE_AFTER).await;
            let mut inner = presenter.inner.lock();
            if inner.epoch != epoch || inner.state != OverlayState::FullScreen {
                return;
            }
            if let Some(announcement) = inner.announcement.as_mut() {
                announcement.collapsed_at = Some(Utc::now());
            }
            presenter.set_state(&mut inner, OverlayState::Collapsed);
        }));
    }

    /// Hands the screen to `engine` and arms it, immediately when the badge
    /// is collapsed, otherwise after the start hold.
    pub fn on_draw_started(&self, prize_name: &str, prize_image: Option<String>, engine: AnimationEngine) {
        let mut inner = self.inner.lock();
        inner.cancel_timer();

        match inner.state {
            OverlayState::Collapsed => {
                self.set_state(&mut inner, OverlayState::Hidden);
                drop(inner);
                engine.start();
                return;
            }
            OverlayState::FullScreen => {
                debug!("Holding standby overlay before start");
            }
            OverlayState::Hidden => {
                inner.announcement = Some(StandbyAnnouncement {
                    prize_name: prize_name.to_string(),
                    prize_image,
                    is_next: false,
                    collapsed_at: None,
                });
                self.set_state(&mut inner, OverlayState::FullScreen);
            }
        }

        let epoch = inner.epoch;
        let presenter = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(START_HOLD).await;
            {
                let mut inner = presenter.inner.lock();
                if inner.epoch != epoch {
                    return;
                }
                inner.timer = None;
                presenter.set_state(&mut inner, OverlayState::Hidden);
            }
            engine.start();
        }));
    }

    /// Destroys any announcement and cancels pending timers.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.cancel_timer();
        self.set_state(&mut inner, OverlayState::Hidden);
    }
}
