// Library root: the league engine (draft clock, picks, protections, trades)
// and the `League` facade that runs each operation in one transaction.

pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod league;
pub mod notify;
pub mod roster;
pub mod time;
pub mod trade;

pub use error::{LeagueError, Result};
pub use league::League;
