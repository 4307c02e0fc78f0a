use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tabdeck::{recovery, DashboardData, Profile};

#[derive(Parser)]
#[command(name = "tabdeck-cli", about = "Tabdeck dashboard storage CLI", version)]
struct Cli {
    /// Use a specific profile directory (default: per-user data dir)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the dashboard document
    Show,

    /// Print the settings document
    Settings,

    /// Print the current sync status
    Status,

    /// Restore the dashboard from the local backup or legacy chunked data
    Recover,

    /// Clear both areas and reseed starter data and default settings
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let profile_dir = match &cli.profile {
        Some(dir) => dir.clone(),
        None => tabdeck::default_profile_dir()?,
    };
    let profile = tabdeck::open_profile(&profile_dir).await?;

    match cli.command {
        Command::Show => {
            let data = profile.hybrid.load_data().await;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
                OutputFormat::Plain => print_dashboard(&data),
            }
        }
        Command::Settings => {
            let settings = profile.hybrid.load_settings().await;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
                OutputFormat::Plain => {
                    println!("version:          {}", settings.version);
                    println!("theme:            {}", settings.theme);
                    if let Some(selected) = &settings.selected_theme {
                        println!("selected theme:   {}", selected);
                    }
                    println!("grid columns:     {}", settings.grid_columns);
                    println!("card width:       {}", settings.card_width);
                    println!("container margin: {}", settings.container_margin);
                    println!("icon stroke:      {}", settings.icon_stroke_width);
                    println!("uniform height:   {}", settings.uniform_card_height);
                }
            }
        }
        Command::Status => {
            let status = profile.hybrid.status_channel().current();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Recover => {
            let outcome = recovery::recover(Some(&profile.sync_area), &profile.local_area).await?;
            match outcome {
                recovery::RecoveryOutcome::RestoredFromLocal => {
                    println!("Restored the dashboard from the local backup.")
                }
                recovery::RecoveryOutcome::RestoredFromChunks => {
                    println!("Reassembled the dashboard from legacy chunked data.")
                }
                recovery::RecoveryOutcome::ClearedBothAreas => {
                    println!("No recoverable data found; cleared both areas. Defaults will repopulate on next load.")
                }
            }
        }
        Command::Reset => {
            let data = profile.hybrid.reset_to_defaults().await;
            println!("Reset complete: {} starter cards.", data.cards.len());
        }
    }

    shutdown(profile);
    Ok(())
}

fn shutdown(profile: Profile) {
    profile.mirror.shutdown();
}

fn print_dashboard(data: &DashboardData) {
    println!(
        "version {} — last modified {} by {}",
        data.version, data.last_modified, data.last_modified_by
    );
    for card in data.cards_sorted() {
        println!("[{}] {} ({})", card.order, card.title, card.color);
        for link in card.links_sorted() {
            println!("  - {} -> {}", link.title, link.url);
            for sub in &link.sub_links {
                let marker = if sub.starred.unwrap_or(false) { "*" } else { " " };
                println!("    {} {} -> {}", marker, sub.title, sub.url);
            }
        }
    }
}
