pub mod audience;
pub mod control;
pub mod present;

pub use audience::{handle_audience_command, AudienceArgs};
pub use control::{handle_control_command, ControlCommands};
pub use present::{handle_present_command, PresentArgs};

/// Resolves once the user presses Ctrl-C.
pub(crate) async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
