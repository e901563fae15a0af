// Application layer: command line and background workers around the league
// engine.

pub mod cli;
pub mod dispatch;
pub mod scheduler;
