use crate::connection::{ConnectionManager, InboundFrame};
use crate::engine::{AnimationEngine, CompletionSender, DigitRollEngine, DrawCompletion};
use crate::error::Result;
use crate::overlay::StandbyPresenter;
use crate::protocol::payloads::{DrawStarted, EventReset, WinnerRevealed};
use crate::protocol::{LifecycleEvent, OutboundMessage};
use crate::reconciler::Reconciler;
use crate::roles::{decode_frame, send_message};
use crate::types::{ConnectionStatus, DrawSession, Participant, Screen};
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ROLE: &str = "presentation";

/// The draw currently on stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDraw {
    /// Server draw id, or a local id when the service sent none.
    pub id: String,
    pub session: DrawSession,
    pub completed: bool,
}

enum Input {
    Frame(InboundFrame),
    Completion(DrawCompletion),
    Status(ConnectionStatus),
    Closed,
}

pub struct Presentation {
    event_id: String,
    connection: ConnectionManager,
    frames: mpsc::UnboundedReceiver<InboundFrame>,
    status: watch::Receiver<ConnectionStatus>,
    engine: AnimationEngine,
    reconciler: Reconciler,
    overlay: StandbyPresenter,
    completions_tx: CompletionSender,
    completions_rx: mpsc::UnboundedReceiver<DrawCompletion>,
    screen: Screen,
    draw: Option<ActiveDraw>,
    last_completion: Option<DrawCompletion>,
    roster: Vec<Participant>,
    connection_count: Option<u32>,
    link_lost: bool,
}

impl Presentation {
    pub fn new(connection: ConnectionManager) -> Self {
        let event_id = connection.config().event_id.clone();
        let (frames, _subscription) = connection.subscribe_all();
        let status = connection.watch_status();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let engine = AnimationEngine::DigitRoll(DigitRollEngine::new(completions_tx.clone()));
        let reconciler = Reconciler::new();
        reconciler.attach(engine.clone());

        Self {
            event_id,
            connection,
            frames,
            status,
            engine,
            reconciler,
            overlay: StandbyPresenter::new(),
            completions_tx,
            completions_rx,
            screen: Screen::Lobby,
            draw: None,
            last_completion: None,
            roster: Vec::new(),
            connection_count: None,
            link_lost: false,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        let event_id = self.event_id.clone();
        self.connection.connect(&event_id).await
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn engine(&self) -> &AnimationEngine {
        &self.engine
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn overlay(&self) -> &StandbyPresenter {
        &self.overlay
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn active_draw(&self) -> Option<&ActiveDraw> {
        self.draw.as_ref()
    }

    pub fn last_completion(&self) -> Option<&DrawCompletion> {
        self.last_completion.as_ref()
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn connection_count(&self) -> Option<u32> {
        self.connection_count
    }

    pub fn handle_frame(&mut self, frame: &InboundFrame) {
        if let Some(event) = decode_frame(ROLE, frame) {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::ParticipantJoined(joined) => {
                if !self.roster.iter().any(|p| p.draw_number == joined.draw_number) {
                    self.roster.push(Participant {
                        draw_number: joined.draw_number,
                        display_name: joined.display_name,
                        created_at: None,
                    });
                }
                debug!("Roster now has {} participant(s)", self.roster.len());
            }
            LifecycleEvent::DrawStandby(standby) => {
                self.screen = Screen::Stage;
                self.overlay.on_standby(&standby.prize_name, standby.prize_image);
            }
            LifecycleEvent::DrawStarted(started) => self.begin_draw(started),
            LifecycleEvent::WinnerRevealed(revealed) => self.reveal(revealed),
            LifecycleEvent::EventReset(reset) => self.reset(&reset),
            LifecycleEvent::ConnectionCount(count) => self.connection_count = Some(count.count),
            LifecycleEvent::WinnerAnnounced(_) | LifecycleEvent::AlreadyWon(_) => {
                debug!("[{}] ignoring {}", ROLE, event.kind());
            }
        }
    }

    /// A `draw_started` for the draw already on stage. Without a draw id,
    /// the same prize, mode and count on an unfinished draw is a resend.
    fn is_repeat(&self, started: &DrawStarted) -> bool {
        let Some(active) = &self.draw else {
            return false;
        };
        match &started.draw_id {
            Some(draw_id) => &active.id == draw_id,
            None => {
                !active.completed
                    && active.session.prize_name == started.prize_name
                    && active.session.draw_mode == started.draw_mode
                    && active.session.winner_count == started.winner_count
            }
        }
    }

    fn begin_draw(&mut self, started: DrawStarted) {
        if self.is_repeat(&started) {
            debug!("Ignoring repeated draw_started for {}", started.prize_name);
            return;
        }

        let session = started.session(&self.event_id);
        let engine = match AnimationEngine::for_mode(
            session.draw_mode,
            session.winner_count,
            self.completions_tx.clone(),
        ) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Cannot run draw for {}: {}", session.prize_name, e);
                return;
            }
        };

        let id = started
            .draw_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            "Draw {} started: {} ({}, {} winner(s))",
            id, session.prize_name, session.draw_mode, session.winner_count
        );

        self.engine.reset();
        self.engine = engine;
        self.reconciler.attach(self.engine.clone());
        self.reconciler.begin_session(&id);
        self.screen = Screen::Stage;
        self.overlay.on_draw_started(
            &session.prize_name,
            session.prize_image.clone(),
            self.engine.clone(),
        );
        self.draw = Some(ActiveDraw {
            id,
            session,
            completed: false,
        });
    }

    fn reveal(&mut self, revealed: WinnerRevealed) {
        let session = revealed
            .draw_id
            .or_else(|| self.draw.as_ref().map(|d| d.id.clone()));
        let outcome = self.reconciler.submit(session.as_deref(), revealed.winners);
        info!("winner_revealed handled: {:?}", outcome);
    }

    fn reset(&mut self, reset: &EventReset) {
        info!(
            "Event reset (participants: {}, draws: {})",
            reset.reset_participants, reset.reset_draws
        );
        self.engine.reset();
        self.reconciler.reset();
        self.overlay.clear();
        self.draw = None;
        self.last_completion = None;
        if reset.reset_draws {
            self.screen = Screen::Lobby;
        }
        if reset.reset_participants {
            self.roster.clear();
        }
    }

    /// Reports a settled reveal to the service, once per draw.
    pub fn on_completion(&mut self, completion: DrawCompletion) {
        if completion.engine_id != self.engine.id() {
            warn!(
                "Dropping completion {:?} from a replaced engine",
                completion.winners.numbers()
            );
            return;
        }
        let Some(draw) = self.draw.as_mut() else {
            warn!("Dropping completion with no active draw");
            return;
        };
        if draw.completed {
            return;
        }
        draw.completed = true;

        let message = OutboundMessage::DrawComplete {
            event_id: self.event_id.clone(),
            winners: completion.winners.clone(),
        };
        match send_message(&self.connection, &message) {
            Ok(()) => info!("Reported draw {} complete", draw.id),
            Err(e) => warn!("Could not report draw {} complete: {}", draw.id, e),
        }
        self.last_completion = Some(completion);
    }

    /// A link that comes back after a drop starts its counters over. The
    /// draw on stage is kept: the service does not replay `draw_started`,
    /// and repeated results are caught by session.
    pub fn on_status(&mut self, status: ConnectionStatus) {
        info!("[{}] connection {}", ROLE, status);
        if status != ConnectionStatus::Connected {
            self.link_lost = true;
            return;
        }
        if self.link_lost {
            self.link_lost = false;
            self.connection_count = None;
            info!("[{}] reconnected, waiting for a fresh connection count", ROLE);
        }
    }

    async fn next_input(&mut self) -> Input {
        tokio::select! {
            biased;

            Some(completion) = self.completions_rx.recv() => Input::Completion(completion),
            frame = self.frames.recv() => match frame {
                Some(frame) => Input::Frame(frame),
                None => Input::Closed,
            },
            changed = self.status.changed() => match changed {
                Ok(()) => Input::Status(*self.status.borrow_and_update()),
                Err(_) => Input::Closed,
            },
        }
    }

    /// Handles the next frame, completion or status change. Returns `false`
    /// once the connection has been torn down.
    pub async fn step(&mut self) -> bool {
        match self.next_input().await {
            Input::Frame(frame) => self.handle_frame(&frame),
            Input::Completion(completion) => self.on_completion(completion),
            Input::Status(status) => self.on_status(status),
            Input::Closed => return false,
        }
        true
    }

    /// Processes events until `shutdown` resolves or the connection closes,
    /// then tears down.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                more = self.step() => {
                    if !more {
                        break;
                    }
                }
            }
        }
        self.teardown().await;
    }

    /// Cancels every timer and poll, then closes the connection.
    pub async fn teardown(&mut self) {
        self.engine.reset();
        self.reconciler.cancel();
        self.overlay.clear();
        self.connection.disconnect().await;
        info!("[{}] torn down", ROLE);
    }
}
