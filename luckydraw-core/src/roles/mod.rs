//! Client roles of a live draw.
//!
//! - [`Controller`] issues commands to the draw service and follows
//!   `winner_announced`.
//! - [`Presentation`] runs the animation engine, the reconciler and the
//!   standby overlay, and reports completion back over its connection.
//! - [`Audience`] shows a participant their ticket and outcome.
//!
//! Each role owns its connection and handles events one at a time, in
//! arrival order.

pub mod audience;
pub mod controller;
pub mod presentation;

pub use audience::{Audience, AudiencePhase, AudienceView};
pub use controller::Controller;
pub use presentation::{ActiveDraw, Presentation};

use crate::connection::{ConnectionManager, InboundFrame};
use crate::error::Result;
use crate::protocol::{LifecycleEvent, OutboundMessage};
use tracing::{debug, warn};

pub(crate) fn send_message(connection: &ConnectionManager, message: &OutboundMessage) -> Result<()> {
    connection.send(message.kind(), message.payload()?)
}

/// Decodes a frame, logging and dropping anything a role cannot use.
pub(crate) fn decode_frame(role: &str, frame: &InboundFrame) -> Option<LifecycleEvent> {
    match LifecycleEvent::decode(frame) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            debug!("[{}] skipping {} frame", role, frame.kind);
            None
        }
        Err(e) => {
            warn!("[{}] dropping {} frame: {}", role, frame.kind, e);
            None
        }
    }
}
