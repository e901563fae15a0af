// Multi-party trades: proposal, responses, commissioner review, execution.

pub mod compliance;
pub mod model;
pub mod timeline;
pub mod transfer;
pub mod voting;
pub mod workflow;
