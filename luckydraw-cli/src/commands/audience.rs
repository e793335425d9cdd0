use crate::commands::interrupted;
use crate::config::CliConfig;
use clap::Args;
use luckydraw_core::roles::{AudiencePhase, AudienceView};
use luckydraw_core::storage::SqliteStore;
use luckydraw_core::{
    Audience, ConnectionManager, DrawNumber, DrawService, HttpDrawService, Result,
};
use std::sync::Arc;

#[derive(Args)]
pub struct AudienceArgs {
    /// Ticket number already handed to this device
    #[arg(short, long, conflicts_with = "register")]
    ticket: Option<u16>,

    /// Ask the draw service for a ticket before joining
    #[arg(short, long)]
    register: bool,

    /// Name to show if this ticket wins
    #[arg(short, long)]
    name: Option<String>,
}

pub async fn handle_audience_command(args: AudienceArgs, config: &CliConfig) -> Result<()> {
    let client = config.client_config();
    let storage = Arc::new(SqliteStore::open(&config.database_path())?);
    let mut audience = Audience::new(ConnectionManager::new(client.clone()), storage)?;

    if let Some(number) = args.ticket {
        let number = DrawNumber::new(number)?;
        audience.register_ticket(number, args.name.as_deref(), None)?;
    } else if args.register {
        let service = HttpDrawService::new(&client);
        let token = audience.tickets().session_token()?;
        let registration = service.register(&client.event_id, token.as_deref()).await?;

        audience.tickets().save_session_token(&registration.session_token)?;
        audience.register_ticket(registration.draw_number, args.name.as_deref(), None)?;
        if registration.is_existing {
            println!("Welcome back, your ticket is {}", registration.draw_number);
        } else {
            println!("Your ticket is {}", registration.draw_number);
        }
    }

    match audience.view().ticket {
        Some(ticket) => println!("Joining '{}' with ticket {}", client.event_id, ticket),
        None => println!(
            "Joining '{}' without a ticket (use --register or --ticket)",
            client.event_id
        ),
    }

    audience.connect().await?;

    let shutdown = interrupted();
    tokio::pin!(shutdown);

    let mut shown = audience.view().clone();
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            more = audience.step() => match more {
                Ok(true) => {}
                Ok(false) => {
                    println!("Connection closed.");
                    break Ok(());
                }
                Err(e) => break Err(e),
            },
        }

        if audience.view().phase != shown.phase || audience.view().is_winner != shown.is_winner {
            print_view(audience.view());
        }
        shown = audience.view().clone();
    };

    audience.leave().await;
    outcome
}

fn print_view(view: &AudienceView) {
    let prize = view.current_prize.as_deref().unwrap_or("the next prize");
    match view.phase {
        AudiencePhase::Waiting => println!("Waiting for the next draw"),
        AudiencePhase::Standby => println!("Up next: {}", prize),
        AudiencePhase::Drawing => println!("Drawing {} now...", prize),
        AudiencePhase::Announced => {
            let winners: Vec<String> = view.last_winners.iter().map(|n| n.to_string()).collect();
            println!("{} goes to {}", prize, winners.join(", "));
        }
    }

    if view.is_winner {
        let won = view.won_prize.as_deref().unwrap_or(prize);
        println!("Congratulations! Your ticket won {}", won);
    }
}
