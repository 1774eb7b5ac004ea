//! Keepsake CLI: render birthday slideshows and manage contributions.
//!
//! Usage:
//!   keepsake export [OPTIONS]     Render all slides into one video
//!   keepsake card <INDEX>         Render one slide as a JPEG card
//!   keepsake plan [OPTIONS]       Print the phase schedule
//!   keepsake check                Check ffmpeg and encoder support
//!   keepsake list                 List slides from the store or cache
//!   keepsake add [OPTIONS]        Add a message for a photo
//!   keepsake upload <FILE>        Upload a photo and add it
//!   keepsake remove <NUMBER>      Remove an uploaded photo from the cache
//!   keepsake clear --yes          Clear cached photos and messages
//!   keepsake stats                Show contribution counts

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use keepsake_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "keepsake",
    about = "Birthday reel: photos and messages rendered into a portrait slideshow video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/keepsake/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every slide into one slideshow video
    Export {
        /// JSON slide list; defaults to the record store and cache
        #[arg(short, long)]
        slides: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Background music (path or URL)
        #[arg(long)]
        music: Option<String>,

        /// Render as fast as frames encode instead of in real time
        #[arg(long)]
        fast: bool,

        /// Drop slides whose image cannot be loaded
        #[arg(long)]
        skip_missing: bool,

        /// Particle seed for a reproducible intro and outro
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Render one slide as a JPEG card
    Card {
        /// 1-based slide number
        index: usize,

        /// JSON slide list; defaults to the record store and cache
        #[arg(short, long)]
        slides: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the phase schedule of an export
    Plan {
        /// Number of slides
        #[arg(long, conflicts_with = "slides")]
        count: Option<usize>,

        /// JSON slide list to count
        #[arg(short, long)]
        slides: Option<PathBuf>,

        /// Print the schedule as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check ffmpeg, encoders, and fonts
    Check,

    /// List slides from the record store or local cache
    List {
        /// Print the slides as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a message for a photo
    Add {
        /// Contributor name
        #[arg(long, default_value = "")]
        name: String,

        /// Message text
        #[arg(long)]
        message: String,

        /// Photo URL
        #[arg(long)]
        photo: String,
    },

    /// Upload a photo to the CDN and add it to the slideshow
    Upload {
        /// Image file (jpg, jpeg, png, gif)
        file: PathBuf,
    },

    /// Remove an uploaded photo from the local cache
    Remove {
        /// 1-based position in upload order
        number: usize,
    },

    /// Delete every cached photo and message
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show local and record store contribution counts
    Stats {
        /// Print the counts as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    keepsake_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Export {
            slides,
            output,
            music,
            fast,
            skip_missing,
            seed,
        } => {
            commands::export::run(
                config,
                commands::export::ExportArgs {
                    slides,
                    output,
                    music,
                    fast,
                    skip_missing,
                    seed,
                },
            )
            .await
        }
        Commands::Card {
            index,
            slides,
            output,
        } => commands::card::run(config, index, slides, output).await,
        Commands::Plan {
            count,
            slides,
            json,
        } => commands::plan::run(count, slides, json),
        Commands::Check => commands::check::run(&config).await,
        Commands::List { json } => commands::list::run(&config, json).await,
        Commands::Add {
            name,
            message,
            photo,
        } => commands::add::run(&config, &name, &message, &photo).await,
        Commands::Upload { file } => commands::upload::run(&config, &file).await,
        Commands::Remove { number } => commands::remove::run(&config, number),
        Commands::Clear { yes } => commands::clear::run(&config, yes),
        Commands::Stats { json } => commands::stats::run(&config, json).await,
    }
}
