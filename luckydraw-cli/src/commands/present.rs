use crate::commands::interrupted;
use crate::config::CliConfig;
use clap::Args;
use luckydraw_core::{ConnectionManager, Presentation, ReconnectPolicy, Result, Screen};

#[derive(Args)]
pub struct PresentArgs {
    /// Exit on the first dropped connection instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,
}

pub async fn handle_present_command(args: PresentArgs, config: &CliConfig) -> Result<()> {
    let mut client = config.client_config();
    if args.no_reconnect {
        client = client.with_reconnect(ReconnectPolicy::disabled());
    }

    let mut presentation = Presentation::new(ConnectionManager::new(client));
    presentation.connect().await?;
    println!("Presenting event '{}'. Press Ctrl-C to stop.", presentation.event_id());

    let shutdown = interrupted();
    tokio::pin!(shutdown);

    let mut screen = presentation.screen();
    let mut reported: Option<String> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            more = presentation.step() => {
                if !more {
                    println!("Connection closed.");
                    break;
                }
            }
        }

        if presentation.screen() != screen {
            screen = presentation.screen();
            match screen {
                Screen::Lobby => println!("Back to the lobby"),
                Screen::Stage => println!("On stage"),
            }
        }

        let finished = presentation
            .active_draw()
            .filter(|draw| draw.completed && reported.as_deref() != Some(draw.id.as_str()))
            .zip(presentation.last_completion());
        if let Some((draw, completion)) = finished {
            let winners: Vec<String> = completion.winners.iter().map(|n| n.to_string()).collect();
            println!("{}: {}", draw.session.prize_name, winners.join(", "));
            reported = Some(draw.id.clone());
        }
    }

    presentation.teardown().await;
    Ok(())
}
