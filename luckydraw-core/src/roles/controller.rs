use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::protocol::payloads::WinnerAnnounced;
use crate::protocol::LifecycleEvent;
use crate::roles::decode_frame;
use crate::service::{
    DrawHistory, DrawService, PrizeAnnouncement, ResetRequest, RevealOutcome, Roster,
    StartDrawRequest,
};
use crate::types::{DrawNumber, DrawRecord};
use std::future::Future;
use tracing::{debug, info};

const ROLE: &str = "controller";

/// Issues draw commands and follows their announced outcome.
pub struct Controller<S: DrawService> {
    service: S,
    event_id: String,
    announcements: Vec<WinnerAnnounced>,
    connection_count: Option<u32>,
}

impl<S: DrawService> Controller<S> {
    pub fn new(service: S, event_id: impl Into<String>) -> Self {
        Self {
            service,
            event_id: event_id.into(),
            announcements: Vec::new(),
            connection_count: None,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn standby(&self, prize: &PrizeAnnouncement) -> Result<()> {
        info!("Announcing next prize {}", prize.prize_name);
        self.service.standby(&self.event_id, prize).await
    }

    /// Rejects a winner count the mode cannot show before anything reaches
    /// the service.
    pub async fn start_draw(&self, request: &StartDrawRequest) -> Result<()> {
        request.validate()?;
        info!(
            "Starting draw for {} ({}, {} winner(s))",
            request.prize_name, request.draw_mode, request.winner_count
        );
        self.service.start_animation(&self.event_id, request).await
    }

    pub async fn reveal(&self) -> Result<RevealOutcome> {
        let outcome = self.service.reveal(&self.event_id).await?;
        info!("Revealed {:?} for {}", outcome.winners.numbers(), outcome.prize_name);
        Ok(outcome)
    }

    pub async fn reset(&self, request: ResetRequest) -> Result<String> {
        info!(
            "Resetting event {} (participants: {}, draws: {})",
            self.event_id, request.reset_participants, request.reset_draws
        );
        self.service.reset(&self.event_id, request).await
    }

    pub async fn roster(&self) -> Result<Roster> {
        self.service.participants(&self.event_id).await
    }

    pub async fn history(&self) -> Result<DrawHistory> {
        self.service.draw_history(&self.event_id).await
    }

    /// Prizes won by one ticket, most recent first.
    pub async fn check_ticket(&self, number: DrawNumber) -> Result<Vec<DrawRecord>> {
        Ok(self.history().await?.wins_for(number))
    }

    pub fn announcements(&self) -> &[WinnerAnnounced] {
        &self.announcements
    }

    pub fn connection_count(&self) -> Option<u32> {
        self.connection_count
    }

    pub fn observe(&mut self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::WinnerAnnounced(announced) => {
                info!(
                    "{} won by {:?}",
                    announced.prize_name,
                    announced.winners.numbers()
                );
                self.announcements.push(announced.clone());
            }
            LifecycleEvent::ConnectionCount(count) => self.connection_count = Some(count.count),
            LifecycleEvent::EventReset(reset) if reset.reset_draws => self.announcements.clear(),
            other => debug!("[{}] ignoring {}", ROLE, other.kind()),
        }
    }

    /// Follows the event's broadcasts until `shutdown` resolves, handing each
    /// lifecycle event to `on_event` after recording it.
    pub async fn follow<F, H>(
        &mut self,
        connection: &mut ConnectionManager,
        shutdown: F,
        mut on_event: H,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
        H: FnMut(&LifecycleEvent),
    {
        let (mut frames, _subscription) = connection.subscribe_all();
        let event_id = self.event_id.clone();
        connection.connect(&event_id).await?;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    if let Some(event) = decode_frame(ROLE, &frame) {
                        self.observe(&event);
                        on_event(&event);
                    }
                }
            }
        }
        connection.disconnect().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LuckyDrawError;
    use crate::service::Registration;
    use crate::types::{DrawMode, WinnerSet};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
        history: Vec<DrawRecord>,
    }

    impl RecordingService {
        fn record(&self, call: &str) {
            self.calls.lock().push(call.to_string());
        }
    }

    #[async_trait]
    impl DrawService for RecordingService {
        async fn register(&self, _event_id: &str, _token: Option<&str>) -> Result<Registration> {
            self.record("register");
            Err(LuckyDrawError::service("not supported"))
        }

        async fn standby(&self, _event_id: &str, _prize: &PrizeAnnouncement) -> Result<()> {
            self.record("standby");
            Ok(())
        }

        async fn start_animation(&self, _event_id: &str, request: &StartDrawRequest) -> Result<()> {
            self.record(&format!("start:{}:{}", request.draw_mode, request.winner_count));
            Ok(())
        }

        async fn reveal(&self, _event_id: &str) -> Result<RevealOutcome> {
            self.record("reveal");
            Ok(RevealOutcome {
                prize_name: "TV".to_string(),
                prize_rank: 1,
                winners: WinnerSet::from_numbers(&[42])?,
                drawn_at: None,
            })
        }

        async fn reset(&self, _event_id: &str, _request: ResetRequest) -> Result<String> {
            self.record("reset");
            Ok("reset".to_string())
        }

        async fn participants(&self, _event_id: &str) -> Result<Roster> {
            Ok(Roster {
                total_count: 0,
                participants: Vec::new(),
            })
        }

        async fn draw_history(&self, _event_id: &str) -> Result<DrawHistory> {
            Ok(DrawHistory {
                total_count: self.history.len() as u32,
                draws: self.history.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_digit_roll_with_five_winners_is_rejected_before_service() {
        let controller = Controller::new(RecordingService::default(), "sfs-2025");
        let request = StartDrawRequest::new("TV", 1).with_mode(DrawMode::DigitRoll, 5);

        let err = controller.start_draw(&request).await.unwrap_err();
        assert!(matches!(
            err,
            LuckyDrawError::InvalidWinnerCount {
                mode: DrawMode::DigitRoll,
                requested: 5,
                max: 1
            }
        ));
        assert!(controller.service().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_valid_start_reaches_service() {
        let controller = Controller::new(RecordingService::default(), "sfs-2025");
        let request = StartDrawRequest::new("TV", 1).with_mode(DrawMode::CardReveal, 3);

        controller.start_draw(&request).await.unwrap();
        controller.reveal().await.unwrap();
        assert_eq!(
            controller.service().calls.lock().as_slice(),
            &["start:card-reveal:3".to_string(), "reveal".to_string()]
        );
    }

    #[test]
    fn test_observe_follows_announcements_only() {
        use crate::protocol::payloads::WinnerRevealed;

        let mut controller = Controller::new(RecordingService::default(), "sfs-2025");
        let winners = WinnerSet::from_numbers(&[42]).unwrap();

        controller.observe(&LifecycleEvent::WinnerRevealed(WinnerRevealed {
            draw_id: None,
            prize_name: Some("TV".to_string()),
            winners: winners.clone(),
        }));
        assert!(controller.announcements().is_empty());

        controller.observe(&LifecycleEvent::WinnerAnnounced(WinnerAnnounced {
            draw_id: None,
            prize_name: "TV".to_string(),
            prize_rank: Some(1),
            winners,
            drawn_at: None,
        }));
        assert_eq!(controller.announcements().len(), 1);
    }

    #[tokio::test]
    async fn test_check_ticket_filters_history() {
        let service = RecordingService {
            history: vec![
                DrawRecord {
                    prize_name: "TV".to_string(),
                    prize_rank: 1,
                    draw_number: DrawNumber::new(42).unwrap(),
                    drawn_at: "2025-01-01T10:00:00".to_string(),
                },
                DrawRecord {
                    prize_name: "Mug".to_string(),
                    prize_rank: 3,
                    draw_number: DrawNumber::new(7).unwrap(),
                    drawn_at: "2025-01-01T11:00:00".to_string(),
                },
            ],
            ..Default::default()
        };
        let controller = Controller::new(service, "sfs-2025");

        let wins = controller.check_ticket(DrawNumber::new(42).unwrap()).await.unwrap();
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].prize_name, "TV");
        assert!(controller
            .check_ticket(DrawNumber::new(1).unwrap())
            .await
            .unwrap()
            .is_empty());
    }
}
