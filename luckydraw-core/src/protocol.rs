//! Draw lifecycle vocabulary shared by every role.
//!
//! Inbound broadcasts decode into [`LifecycleEvent`]; frames of unknown type
//! decode to `None` so newer servers can add events without breaking older
//! clients. Outbound frames are built from [`OutboundMessage`].

use crate::connection::InboundFrame;
use crate::error::{LuckyDrawError, Result};
use crate::types::{DrawNumber, DrawSession, WinnerSet};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ParticipantJoined,
    DrawStandby,
    DrawStarted,
    WinnerRevealed,
    WinnerAnnounced,
    EventReset,
    ConnectionCount,
    AlreadyWon,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::ParticipantJoined,
        EventKind::DrawStandby,
        EventKind::DrawStarted,
        EventKind::WinnerRevealed,
        EventKind::WinnerAnnounced,
        EventKind::EventReset,
        EventKind::ConnectionCount,
        EventKind::AlreadyWon,
    ];

    /// Frame `type` on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ParticipantJoined => "participant_joined",
            EventKind::DrawStandby => "draw_standby",
            EventKind::DrawStarted => "draw_started",
            EventKind::WinnerRevealed => "winner_revealed",
            EventKind::WinnerAnnounced => "winner_announced",
            EventKind::EventReset => "event_reset",
            EventKind::ConnectionCount => "connection_count",
            EventKind::AlreadyWon => "already_won",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod payloads {
    use crate::types::{DrawMode, DrawNumber, WinnerSet};
    use serde::{Deserialize, Deserializer};

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct ParticipantJoined {
        pub draw_number: DrawNumber,
        #[serde(default)]
        pub display_name: Option<String>,
        #[serde(default)]
        pub total_count: Option<u32>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct DrawStandby {
        pub prize_name: String,
        #[serde(default)]
        pub prize_image: Option<String>,
        #[serde(default)]
        pub prize_rank: Option<u32>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct DrawStarted {
        /// Server-assigned draw identity, when the service provides one.
        #[serde(default)]
        pub draw_id: Option<String>,
        pub prize_name: String,
        #[serde(default)]
        pub prize_image: Option<String>,
        #[serde(default)]
        pub prize_rank: Option<u32>,
        #[serde(default)]
        pub draw_mode: DrawMode,
        #[serde(default = "default_winner_count")]
        pub winner_count: u32,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct WinnerRevealed {
        #[serde(default)]
        pub draw_id: Option<String>,
        #[serde(default)]
        pub prize_name: Option<String>,
        #[serde(deserialize_with = "wire_winners")]
        pub winners: WinnerSet,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct WinnerAnnounced {
        #[serde(default)]
        pub draw_id: Option<String>,
        #[serde(default)]
        pub prize_name: String,
        #[serde(default)]
        pub prize_rank: Option<u32>,
        #[serde(deserialize_with = "wire_winners")]
        pub winners: WinnerSet,
        #[serde(default)]
        pub drawn_at: Option<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
    pub struct EventReset {
        #[serde(default)]
        pub reset_participants: bool,
        #[serde(default)]
        pub reset_draws: bool,
        #[serde(default)]
        pub event_session_id: Option<String>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
    pub struct ConnectionCount {
        pub count: u32,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct WonPrize {
        pub prize_name: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct AlreadyWon {
        pub won: bool,
        #[serde(default)]
        pub prizes: Vec<WonPrize>,
    }

    fn default_winner_count() -> u32 {
        1
    }

    /// Winners arrive either as bare numbers or as `{draw_number}` objects.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireWinner {
        Number(u16),
        Entry { draw_number: u16 },
    }

    pub(crate) fn wire_winners<'de, D>(deserializer: D) -> Result<WinnerSet, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<WireWinner>::deserialize(deserializer)?;
        let numbers: Vec<u16> = raw
            .into_iter()
            .map(|w| match w {
                WireWinner::Number(n) => n,
                WireWinner::Entry { draw_number } => draw_number,
            })
            .collect();
        WinnerSet::from_numbers(&numbers).map_err(serde::de::Error::custom)
    }
}

use payloads::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    ParticipantJoined(ParticipantJoined),
    DrawStandby(DrawStandby),
    DrawStarted(DrawStarted),
    WinnerRevealed(WinnerRevealed),
    WinnerAnnounced(WinnerAnnounced),
    EventReset(EventReset),
    ConnectionCount(ConnectionCount),
    AlreadyWon(AlreadyWon),
}

impl LifecycleEvent {
    /// `Ok(None)` for frame types outside the lifecycle vocabulary; `Err` for
    /// a known type with a payload that cannot be used.
    pub fn decode(frame: &InboundFrame) -> Result<Option<Self>> {
        let Some(kind) = EventKind::from_wire(&frame.kind) else {
            return Ok(None);
        };

        let payload = frame.payload.clone();
        let event = match kind {
            EventKind::ParticipantJoined => Self::ParticipantJoined(parse(kind, payload)?),
            EventKind::DrawStandby => Self::DrawStandby(parse(kind, payload)?),
            EventKind::DrawStarted => Self::DrawStarted(parse(kind, payload)?),
            EventKind::WinnerRevealed => {
                let revealed: WinnerRevealed = parse(kind, payload)?;
                require_winners(kind, &revealed.winners)?;
                Self::WinnerRevealed(revealed)
            }
            EventKind::WinnerAnnounced => {
                let announced: WinnerAnnounced = parse(kind, payload)?;
                require_winners(kind, &announced.winners)?;
                Self::WinnerAnnounced(announced)
            }
            EventKind::EventReset => Self::EventReset(parse(kind, payload)?),
            EventKind::ConnectionCount => Self::ConnectionCount(parse(kind, payload)?),
            EventKind::AlreadyWon => Self::AlreadyWon(parse(kind, payload)?),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::ParticipantJoined(_) => EventKind::ParticipantJoined,
            Self::DrawStandby(_) => EventKind::DrawStandby,
            Self::DrawStarted(_) => EventKind::DrawStarted,
            Self::WinnerRevealed(_) => EventKind::WinnerRevealed,
            Self::WinnerAnnounced(_) => EventKind::WinnerAnnounced,
            Self::EventReset(_) => EventKind::EventReset,
            Self::ConnectionCount(_) => EventKind::ConnectionCount,
            Self::AlreadyWon(_) => EventKind::AlreadyWon,
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: EventKind, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| LuckyDrawError::protocol(format!("Malformed {} payload: {}", kind, e)))
}

fn require_winners(kind: EventKind, winners: &WinnerSet) -> Result<()> {
    if winners.is_empty() {
        return Err(LuckyDrawError::protocol(format!(
            "{} carried no winners",
            kind
        )));
    }
    Ok(())
}

impl DrawStarted {
    pub fn session(&self, event_id: &str) -> DrawSession {
        DrawSession {
            event_id: event_id.to_string(),
            prize_name: self.prize_name.clone(),
            prize_image: self.prize_image.clone(),
            prize_rank: self.prize_rank,
            draw_mode: self.draw_mode,
            winner_count: self.winner_count,
        }
    }
}

/// Frames a client sends on its broadcast connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Presentation's completion signal once its reveal has settled.
    DrawComplete { event_id: String, winners: WinnerSet },
    Identify { draw_number: DrawNumber },
    SubmitWinnerInfo {
        event_id: String,
        draw_number: DrawNumber,
        prize_name: String,
        name: Option<String>,
    },
    Ping,
}

#[derive(Serialize)]
struct DrawCompleteBody<'a> {
    event_id: &'a str,
    winning_number: Option<DrawNumber>,
    winners: &'a WinnerSet,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DrawComplete { .. } => "draw_complete",
            Self::Identify { .. } => "identify",
            Self::SubmitWinnerInfo { .. } => "submit_winner_info",
            Self::Ping => "ping",
        }
    }

    pub fn payload(&self) -> Result<Value> {
        let value = match self {
            Self::DrawComplete { event_id, winners } => serde_json::to_value(DrawCompleteBody {
                event_id,
                winning_number: winners.first(),
                winners,
            })?,
            Self::Identify { draw_number } => serde_json::json!({ "draw_number": draw_number }),
            Self::SubmitWinnerInfo {
                event_id,
                draw_number,
                prize_name,
                name,
            } => serde_json::json!({
                "event_id": event_id,
                "draw_number": draw_number,
                "prize_name": prize_name,
                "name": name,
            }),
            Self::Ping => Value::Null,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DrawMode;
    use serde_json::json;

    fn frame(kind: &str, payload: Value) -> InboundFrame {
        let mut payload = payload;
        payload["type"] = json!(kind);
        InboundFrame {
            kind: kind.to_string(),
            payload,
        }
    }

    #[test]
    fn test_draw_started_defaults_and_aliases() {
        let event = LifecycleEvent::decode(&frame("draw_started", json!({ "prize_name": "TV" })))
            .unwrap()
            .unwrap();
        let LifecycleEvent::DrawStarted(started) = event else {
            panic!("expected draw_started");
        };
        assert_eq!(started.draw_mode, DrawMode::DigitRoll);
        assert_eq!(started.winner_count, 1);

        let event = LifecycleEvent::decode(&frame(
            "draw_started",
            json!({ "prize_name": "TV", "draw_mode": "card", "winner_count": 3 }),
        ))
        .unwrap()
        .unwrap();
        let LifecycleEvent::DrawStarted(started) = event else {
            panic!("expected draw_started");
        };
        assert_eq!(started.draw_mode, DrawMode::CardReveal);
        assert_eq!(started.session("sfs-2025").winner_count, 3);
    }

    #[test]
    fn test_winners_accept_both_wire_shapes() {
        let plain = LifecycleEvent::decode(&frame("winner_revealed", json!({ "winners": [42, 7] })))
            .unwrap()
            .unwrap();
        let objects = LifecycleEvent::decode(&frame(
            "winner_revealed",
            json!({ "winners": [{ "draw_number": 42 }, { "draw_number": 7 }] }),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(plain, objects);
    }

    #[test]
    fn test_missing_or_empty_winners_is_malformed() {
        assert!(LifecycleEvent::decode(&frame("winner_revealed", json!({}))).is_err());
        assert!(LifecycleEvent::decode(&frame("winner_announced", json!({ "winners": [] }))).is_err());
        assert!(
            LifecycleEvent::decode(&frame("winner_revealed", json!({ "winners": [300] }))).is_err()
        );
    }

    #[test]
    fn test_unknown_frames_are_skipped() {
        assert_eq!(LifecycleEvent::decode(&frame("pong", json!({}))).unwrap(), None);
    }

    #[test]
    fn test_draw_complete_payload() {
        let message = OutboundMessage::DrawComplete {
            event_id: "sfs-2025".to_string(),
            winners: WinnerSet::from_numbers(&[42, 7, 190]).unwrap(),
        };
        assert_eq!(message.kind(), "draw_complete");
        assert_eq!(
            message.payload().unwrap(),
            json!({ "event_id": "sfs-2025", "winning_number": 42, "winners": [42, 7, 190] })
        );
    }
}
