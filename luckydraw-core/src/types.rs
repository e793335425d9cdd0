use crate::error::{LuckyDrawError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest ticket number the registry hands out.
pub const MAX_DRAW_NUMBER: u16 = 299;

/// Animation used by the presentation surface for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawMode {
    #[default]
    #[serde(alias = "slot")]
    DigitRoll,
    #[serde(alias = "card")]
    CardReveal,
    #[serde(alias = "network")]
    NodeSearch,
}

impl DrawMode {
    pub fn max_winners(self) -> u32 {
        match self {
            DrawMode::DigitRoll => 1,
            DrawMode::CardReveal | DrawMode::NodeSearch => 10,
        }
    }

    /// Rejects winner counts the mode cannot animate. Never truncates.
    pub fn validate_winner_count(self, requested: u32) -> Result<()> {
        let max = self.max_winners();
        if requested == 0 || requested > max {
            return Err(LuckyDrawError::InvalidWinnerCount {
                mode: self,
                requested,
                max,
            });
        }
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DrawMode::DigitRoll => "digit-roll",
            DrawMode::CardReveal => "card-reveal",
            DrawMode::NodeSearch => "node-search",
        }
    }
}

impl fmt::Display for DrawMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DrawMode {
    type Err = LuckyDrawError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "digit-roll" | "slot" => Ok(DrawMode::DigitRoll),
            "card-reveal" | "card" => Ok(DrawMode::CardReveal),
            "node-search" | "network" => Ok(DrawMode::NodeSearch),
            other => Err(LuckyDrawError::config(format!(
                "Unknown draw mode: {}",
                other
            ))),
        }
    }
}

/// A participant's ticket number, always within `0..=MAX_DRAW_NUMBER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct DrawNumber(u16);

impl DrawNumber {
    pub fn new(value: u16) -> Result<Self> {
        if value > MAX_DRAW_NUMBER {
            return Err(LuckyDrawError::protocol(format!(
                "Draw number {} outside 0..={}",
                value, MAX_DRAW_NUMBER
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Hundreds, tens and units, as shown on the digit reels.
    pub fn digits(self) -> [u8; 3] {
        let n = self.0;
        [(n / 100) as u8, ((n % 100) / 10) as u8, (n % 10) as u8]
    }
}

impl TryFrom<u16> for DrawNumber {
    type Error = LuckyDrawError;

    fn try_from(value: u16) -> Result<Self> {
        DrawNumber::new(value)
    }
}

impl From<DrawNumber> for u16 {
    fn from(number: DrawNumber) -> Self {
        number.0
    }
}

impl fmt::Display for DrawNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Winners of one draw in rank order; index 0 is rank 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WinnerSet(Vec<DrawNumber>);

impl WinnerSet {
    pub fn new(winners: Vec<DrawNumber>) -> Self {
        Self(winners)
    }

    pub fn from_numbers(numbers: &[u16]) -> Result<Self> {
        numbers
            .iter()
            .map(|&n| DrawNumber::new(n))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn first(&self) -> Option<DrawNumber> {
        self.0.first().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, number: DrawNumber) -> bool {
        self.0.contains(&number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawNumber> {
        self.0.iter()
    }

    /// Keeps the first `limit` ranks.
    pub fn truncated(&self, limit: usize) -> Self {
        Self(self.0.iter().take(limit).copied().collect())
    }

    pub fn numbers(&self) -> Vec<u16> {
        self.0.iter().map(|n| n.value()).collect()
    }
}

/// Parameters of one draw, fixed from `draw_started` until completion or reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawSession {
    pub event_id: String,
    pub prize_name: String,
    pub prize_image: Option<String>,
    pub prize_rank: Option<u32>,
    pub draw_mode: DrawMode,
    pub winner_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub draw_number: DrawNumber,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One drawn ticket as recorded in the service's draw history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub prize_name: String,
    pub prize_rank: u32,
    pub draw_number: DrawNumber,
    pub drawn_at: String,
}

/// Lifecycle state every animation engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Armed,
    Revealing,
    Settled,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Armed => "armed",
            EngineState::Revealing => "revealing",
            EngineState::Settled => "settled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandbyAnnouncement {
    pub prize_name: String,
    pub prize_image: Option<String>,
    /// `true` for "next prize", `false` for "now drawing".
    pub is_next: bool,
    pub collapsed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Top-level screen of a presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Lobby,
    Stage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_roll_rejects_multiple_winners() {
        let err = DrawMode::DigitRoll.validate_winner_count(5).unwrap_err();
        assert!(matches!(
            err,
            LuckyDrawError::InvalidWinnerCount {
                mode: DrawMode::DigitRoll,
                requested: 5,
                max: 1
            }
        ));
        assert!(DrawMode::DigitRoll.validate_winner_count(1).is_ok());
        assert!(DrawMode::CardReveal.validate_winner_count(0).is_err());
        assert!(DrawMode::CardReveal.validate_winner_count(3).is_ok());
    }

    #[test]
    fn test_draw_number_range() {
        assert!(DrawNumber::new(299).is_ok());
        assert!(DrawNumber::new(300).is_err());
        assert_eq!(DrawNumber::new(7).unwrap().digits(), [0, 0, 7]);
        assert_eq!(DrawNumber::new(173).unwrap().to_string(), "173");
    }

    #[test]
    fn test_mode_aliases() {
        let mode: DrawMode = serde_json::from_str("\"network\"").unwrap();
        assert_eq!(mode, DrawMode::NodeSearch);
        let mode: DrawMode = serde_json::from_str("\"card-reveal\"").unwrap();
        assert_eq!(mode, DrawMode::CardReveal);
        assert_eq!("slot".parse::<DrawMode>().unwrap(), DrawMode::DigitRoll);
    }

    #[test]
    fn test_winner_set_rejects_out_of_range() {
        let parsed: std::result::Result<WinnerSet, _> = serde_json::from_str("[42, 300]");
        assert!(parsed.is_err());
        let set: WinnerSet = serde_json::from_str("[42, 7, 190]").unwrap();
        assert_eq!(set.numbers(), vec![42, 7, 190]);
        assert_eq!(set.truncated(2).numbers(), vec![42, 7]);
    }
}
