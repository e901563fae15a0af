// Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ftt_core::trade::model::Vote;

/// Fantasy league draft clock and trade desk.
#[derive(Parser, Debug)]
#[command(name = "ftt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `config/` and `defaults/`
    #[arg(long, global = true, default_value = ".")]
    pub base_dir: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the auto-draft scheduler and notification dispatcher until Ctrl+C
    Run,

    /// Generate the order and open the first pick of a draft
    StartDraft {
        #[arg(long)]
        draft: i64,
    },

    /// Pick for the position on the clock (auto-pick when no player is given)
    Pick {
        #[arg(long)]
        position: i64,
        #[arg(long)]
        player: Option<i64>,
    },

    /// Cast a commissioner vote on an accepted trade
    Vote {
        #[arg(long)]
        trade: i64,
        #[arg(long)]
        user: i64,
        #[arg(long, value_enum)]
        vote: VoteArg,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Transfer the assets of an accepted or approved trade
    ExecuteTrade {
        #[arg(long)]
        trade: i64,
    },

    /// Print a draft board
    Board {
        #[arg(long)]
        draft: i64,
    },

    /// Auto-pick every expired clock once and exit
    ProcessExpired,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteArg {
    Approve,
    Veto,
}

impl From<VoteArg> for Vote {
    fn from(v: VoteArg) -> Self {
        match v {
            VoteArg::Approve => Vote::Approve,
            VoteArg::Veto => Vote::Veto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vote() {
        let cli = Cli::parse_from(["ftt", "vote", "--trade", "4", "--user", "2", "--vote", "veto"]);
        match cli.command {
            Commands::Vote { trade, user, vote, notes } => {
                assert_eq!((trade, user), (4, 2));
                assert_eq!(Vote::from(vote), Vote::Veto);
                assert!(notes.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn pick_player_is_optional() {
        let cli = Cli::parse_from(["ftt", "--base-dir", "/srv/league", "pick", "--position", "7"]);
        assert_eq!(cli.base_dir, PathBuf::from("/srv/league"));
        assert!(matches!(cli.command, Commands::Pick { position: 7, player: None }));
    }
}
