use crate::commands::interrupted;
use crate::config::CliConfig;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use luckydraw_core::service::{PrizeAnnouncement, ResetRequest};
use luckydraw_core::{
    ConnectionManager, Controller, DrawMode, DrawNumber, HttpDrawService, LifecycleEvent,
    LuckyDrawError, Result, StartDrawRequest,
};

#[derive(Subcommand)]
pub enum ControlCommands {
    /// Announce the next prize on every screen
    Standby {
        /// Prize name
        prize: String,
        /// Prize rank (1 is the top prize)
        #[arg(short, long, default_value_t = 1)]
        rank: u32,
        /// Prize image URL
        #[arg(short, long)]
        image: Option<String>,
    },
    /// Start the draw animation
    Start {
        /// Prize name
        prize: String,
        /// Animation (digit-roll, card-reveal, node-search)
        #[arg(short, long, default_value = "digit-roll")]
        mode: DrawMode,
        /// Number of winners
        #[arg(short, long, default_value_t = 1)]
        winners: u32,
        /// Prize rank (1 is the top prize)
        #[arg(short, long, default_value_t = 1)]
        rank: u32,
        /// Prize image URL
        #[arg(short, long)]
        image: Option<String>,
    },
    /// Draw and reveal the winners of the running draw
    Reveal,
    /// Reset the event
    Reset {
        /// Also forget every registered participant
        #[arg(short, long)]
        participants: bool,
        /// Keep the draw history
        #[arg(short, long)]
        keep_draws: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List registered participants
    Roster,
    /// Show the draw history
    History,
    /// Show what a ticket has won
    Check {
        /// Ticket number
        number: u16,
    },
    /// Follow the event's broadcasts until Ctrl-C
    Watch,
}

pub async fn handle_control_command(cmd: ControlCommands, config: &CliConfig) -> Result<()> {
    let client = config.client_config();
    let mut controller = Controller::new(HttpDrawService::new(&client), client.event_id.clone());

    match cmd {
        ControlCommands::Standby { prize, rank, image } => {
            let announcement = PrizeAnnouncement {
                prize_name: prize,
                prize_rank: rank,
                prize_image: image,
            };
            controller.standby(&announcement).await?;
            println!("Announced '{}' as the next prize.", announcement.prize_name);
        }

        ControlCommands::Start {
            prize,
            mode,
            winners,
            rank,
            image,
        } => {
            let mut request = StartDrawRequest::new(prize, rank).with_mode(mode, winners);
            request.prize_image = image;

            controller.start_draw(&request).await?;
            println!(
                "Draw for '{}' started ({}, {} winner(s)).",
                request.prize_name, request.draw_mode, request.winner_count
            );
        }

        ControlCommands::Reveal => {
            let outcome = controller.reveal().await?;
            let winners: Vec<String> = outcome.winners.iter().map(|n| n.to_string()).collect();
            println!("{} (rank {})", outcome.prize_name, outcome.prize_rank);
            println!("  Winners: {}", winners.join(", "));
        }

        ControlCommands::Reset {
            participants,
            keep_draws,
            yes,
        } => {
            let request = ResetRequest {
                reset_participants: participants,
                reset_draws: !keep_draws,
            };
            if !request.reset_participants && !request.reset_draws {
                println!("Nothing to reset.");
                return Ok(());
            }

            if !yes {
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Reset event '{}'? This action cannot be undone.",
                        controller.event_id()
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| LuckyDrawError::internal(e.to_string()))?;

                if !confirm {
                    println!("Reset cancelled.");
                    return Ok(());
                }
            }

            let message = controller.reset(request).await?;
            println!("{}", message);
        }

        ControlCommands::Roster => {
            let roster = controller.roster().await?;

            if roster.participants.is_empty() {
                println!("No participants registered yet.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Ticket", "Name", "Joined"]);
            for participant in &roster.participants {
                table.add_row(vec![
                    participant.draw_number.to_string(),
                    participant.display_name.clone().unwrap_or_default(),
                    participant.created_at.clone().unwrap_or_default(),
                ]);
            }

            println!("{}", table);
            println!("Total: {}", roster.total_count);
        }

        ControlCommands::History => {
            let history = controller.history().await?;

            if history.draws.is_empty() {
                println!("No draws yet.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Prize", "Rank", "Ticket", "Drawn at"]);
            for draw in &history.draws {
                table.add_row(vec![
                    draw.prize_name.clone(),
                    draw.prize_rank.to_string(),
                    draw.draw_number.to_string(),
                    draw.drawn_at.clone(),
                ]);
            }

            println!("{}", table);
        }

        ControlCommands::Check { number } => {
            let number = DrawNumber::new(number)?;
            let wins = controller.check_ticket(number).await?;

            if wins.is_empty() {
                println!("Ticket {} has not won anything.", number);
                return Ok(());
            }

            println!("Ticket {} won:", number);
            for win in wins {
                println!("  {} (rank {}) at {}", win.prize_name, win.prize_rank, win.drawn_at);
            }
        }

        ControlCommands::Watch => {
            let mut connection = ConnectionManager::new(client);
            println!("Watching '{}'. Press Ctrl-C to stop.", controller.event_id());

            controller
                .follow(&mut connection, interrupted(), print_event)
                .await?;
        }
    }

    Ok(())
}

fn print_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::ParticipantJoined(joined) => {
            println!("Ticket {} joined", joined.draw_number);
        }
        LifecycleEvent::DrawStandby(standby) => println!("Standby: {}", standby.prize_name),
        LifecycleEvent::DrawStarted(started) => println!(
            "Started: {} ({}, {} winner(s))",
            started.prize_name, started.draw_mode, started.winner_count
        ),
        LifecycleEvent::WinnerAnnounced(announced) => {
            let winners: Vec<String> = announced.winners.iter().map(|n| n.to_string()).collect();
            println!("Winners of {}: {}", announced.prize_name, winners.join(", "));
        }
        LifecycleEvent::EventReset(reset) => println!(
            "Event reset (participants: {}, draws: {})",
            reset.reset_participants, reset.reset_draws
        ),
        LifecycleEvent::ConnectionCount(count) => println!("{} connected", count.count),
        LifecycleEvent::WinnerRevealed(_) | LifecycleEvent::AlreadyWon(_) => {}
    }
}
