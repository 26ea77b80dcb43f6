use clap::{Parser, Subcommand, ValueEnum};
use dnd_core::TurnMode;
use std::path::PathBuf;

/// How players settle on their actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Each player declares an intent straight away
    Quick,
    /// Situation, questions, party feedback, then a decision
    Deliberate,
}

impl From<Mode> for TurnMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Quick => TurnMode::Quick,
            Mode::Deliberate => TurnMode::Deliberate,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "dnd",
    about = "A party of AI players adventuring under an AI Dungeon Master",
    after_help = "Configuration is read from the environment (ANTHROPIC_API_KEY, DND_*) and a .env file."
)]
pub struct Cli {
    /// Directory holding save files
    #[arg(long, global = true)]
    pub save_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play rounds of a campaign
    Play {
        /// Number of rounds to play (defaults to DND_ROUNDS)
        #[arg(short, long)]
        rounds: Option<u32>,

        /// Scenario JSON file (defaults to the built-in Crimson Crypt)
        #[arg(long, conflicts_with = "load")]
        scenario: Option<PathBuf>,

        /// Resume the auto-save of this campaign
        #[arg(long)]
        load: Option<String>,

        /// Turn mode (defaults to DND_TURN_MODE)
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Seed for success rolls
        #[arg(long)]
        seed: Option<u64>,

        /// Play this character yourself; repeat for several
        #[arg(long = "human", value_name = "NAME")]
        humans: Vec<String>,

        /// Also keep a snapshot of every round
        #[arg(long)]
        round_saves: bool,
    },

    /// List saved games
    Saves,

    /// Print the summary of a saved campaign
    Summary {
        /// Campaign name
        campaign: String,
    },
}
