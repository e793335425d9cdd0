use crate::connection::{ConnectionManager, InboundFrame};
use crate::error::Result;
use crate::protocol::payloads::{EventReset, WinnerAnnounced};
use crate::protocol::{LifecycleEvent, OutboundMessage};
use crate::roles::{decode_frame, send_message};
use crate::storage::{StoragePort, TicketStore};
use crate::types::{ConnectionStatus, DrawNumber, WinnerSet};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const ROLE: &str = "audience";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudiencePhase {
    #[default]
    Waiting,
    Standby,
    Drawing,
    Announced,
}

/// Everything a participant's screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceView {
    pub ticket: Option<DrawNumber>,
    pub display_name: Option<String>,
    pub phase: AudiencePhase,
    pub current_prize: Option<String>,
    pub is_winner: bool,
    pub won_prize: Option<String>,
    pub last_winners: WinnerSet,
    pub participant_count: Option<u32>,
    pub connection_count: Option<u32>,
}

pub struct Audience {
    event_id: String,
    connection: ConnectionManager,
    frames: mpsc::UnboundedReceiver<InboundFrame>,
    status: watch::Receiver<ConnectionStatus>,
    storage: Arc<dyn StoragePort>,
    view: AudienceView,
    submitted: HashSet<String>,
}

impl Audience {
    /// Restores any ticket already held on this device.
    pub fn new(connection: ConnectionManager, storage: Arc<dyn StoragePort>) -> Result<Self> {
        let event_id = connection.config().event_id.clone();
        let (frames, _subscription) = connection.subscribe_all();
        let status = connection.watch_status();

        let mut audience = Self {
            event_id,
            connection,
            frames,
            status,
            storage,
            view: AudienceView::default(),
            submitted: HashSet::new(),
        };
        let tickets = audience.tickets();
        let ticket = tickets.ticket()?;
        let display_name = tickets.display_name()?;
        audience.view.ticket = ticket;
        audience.view.display_name = display_name;
        Ok(audience)
    }

    pub fn tickets(&self) -> TicketStore<'_> {
        TicketStore::new(self.storage.as_ref())
    }

    pub fn view(&self) -> &AudienceView {
        &self.view
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Stores a freshly assigned ticket on this device.
    pub fn register_ticket(
        &mut self,
        number: DrawNumber,
        display_name: Option<&str>,
        event_session_id: Option<&str>,
    ) -> Result<()> {
        let tickets = self.tickets();
        tickets.save_ticket(number)?;
        if let Some(name) = display_name {
            tickets.save_display_name(name)?;
        }
        if let Some(session) = event_session_id {
            tickets.save_event_session_id(session)?;
        }
        self.view.ticket = Some(number);
        self.view.display_name = display_name.map(str::to_string);
        info!("Holding ticket {}", number);

        if self.connection.is_connected() {
            self.identify();
        }
        Ok(())
    }

    pub async fn connect(&mut self) -> Result<()> {
        let event_id = self.event_id.clone();
        self.connection.connect(&event_id).await
    }

    /// Tells the service which ticket this device holds so it can replay
    /// an earlier win.
    fn identify(&self) {
        let Some(draw_number) = self.view.ticket else {
            return;
        };
        if let Err(e) = send_message(&self.connection, &OutboundMessage::Identify { draw_number }) {
            warn!("Could not identify ticket {}: {}", draw_number, e);
        }
    }

    pub fn on_status(&mut self, status: ConnectionStatus) {
        info!("[{}] connection {}", ROLE, status);
        if status == ConnectionStatus::Connected {
            self.identify();
        }
    }

    pub fn handle_frame(&mut self, frame: &InboundFrame) -> Result<()> {
        match decode_frame(ROLE, frame) {
            Some(event) => self.handle_event(event),
            None => Ok(()),
        }
    }

    pub fn handle_event(&mut self, event: LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::DrawStandby(standby) => {
                self.view.phase = AudiencePhase::Standby;
                self.view.current_prize = Some(standby.prize_name);
                self.clear_outcome();
            }
            LifecycleEvent::DrawStarted(started) => {
                self.view.phase = AudiencePhase::Drawing;
                self.view.current_prize = Some(started.prize_name);
                self.clear_outcome();
            }
            LifecycleEvent::WinnerAnnounced(announced) => self.announce(announced),
            LifecycleEvent::EventReset(reset) => self.reset(&reset)?,
            LifecycleEvent::AlreadyWon(won) => {
                if let (true, Some(latest)) = (won.won, won.prizes.first()) {
                    info!("Ticket already won {}", latest.prize_name);
                    self.view.is_winner = true;
                    self.view.won_prize = Some(latest.prize_name.clone());
                }
            }
            LifecycleEvent::ParticipantJoined(joined) => {
                self.view.participant_count = Some(
                    joined
                        .total_count
                        .unwrap_or_else(|| self.view.participant_count.unwrap_or(0) + 1),
                );
            }
            LifecycleEvent::ConnectionCount(count) => {
                self.view.connection_count = Some(count.count);
            }
            LifecycleEvent::WinnerRevealed(_) => {
                debug!("[{}] ignoring winner_revealed", ROLE);
            }
        }
        Ok(())
    }

    fn clear_outcome(&mut self) {
        self.view.is_winner = false;
        self.view.won_prize = None;
    }

    fn announce(&mut self, announced: WinnerAnnounced) {
        self.view.phase = AudiencePhase::Announced;
        self.view.last_winners = announced.winners.clone();

        let Some(ticket) = self.view.ticket else {
            return;
        };
        if !announced.winners.contains(ticket) {
            return;
        }

        info!("Ticket {} won {}", ticket, announced.prize_name);
        self.view.is_winner = true;
        self.view.won_prize = Some(announced.prize_name.clone());

        let key = announced
            .draw_id
            .clone()
            .unwrap_or_else(|| format!("{}:{:?}", announced.prize_name, announced.winners.numbers()));
        if !self.submitted.insert(key) {
            return;
        }
        let message = OutboundMessage::SubmitWinnerInfo {
            event_id: self.event_id.clone(),
            draw_number: ticket,
            prize_name: announced.prize_name,
            name: self.view.display_name.clone(),
        };
        if let Err(e) = send_message(&self.connection, &message) {
            warn!("Could not submit winner info: {}", e);
        }
    }

    fn reset(&mut self, reset: &EventReset) -> Result<()> {
        if let Some(incoming) = &reset.event_session_id {
            let stored = self.tickets().event_session_id()?;
            if stored.as_ref().is_some_and(|s| s != incoming) {
                info!("Event session changed; discarding ticket");
                return self.forget_ticket();
            }
        }

        if reset.reset_participants {
            return self.forget_ticket();
        }
        if reset.reset_draws {
            self.view.phase = AudiencePhase::Waiting;
            self.view.current_prize = None;
            self.view.last_winners = WinnerSet::default();
            self.clear_outcome();
            self.submitted.clear();
        }
        Ok(())
    }

    fn forget_ticket(&mut self) -> Result<()> {
        self.tickets().clear()?;
        let connection_count = self.view.connection_count;
        self.view = AudienceView {
            connection_count,
            ..AudienceView::default()
        };
        self.submitted.clear();
        Ok(())
    }

    /// Handles the next frame or status change. Returns `false` once the
    /// connection has been torn down.
    pub async fn step(&mut self) -> Result<bool> {
        tokio::select! {
            frame = self.frames.recv() => match frame {
                Some(frame) => self.handle_frame(&frame)?,
                None => return Ok(false),
            },
            changed = self.status.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
                let status = *self.status.borrow_and_update();
                self.on_status(status);
            }
        }
        Ok(true)
    }

    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                more = self.step() => match more {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };
        self.leave().await;
        outcome
    }

    /// Closes the connection. The stored ticket stays on the device.
    pub async fn leave(&mut self) {
        self.connection.disconnect().await;
    }
}
