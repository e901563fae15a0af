// Draft engine: order, pick clock, protections, auto-pick and execution.

pub mod autopick;
pub mod clock;
pub mod executor;
pub mod model;
pub mod order;
pub mod pick;
pub mod protection;
pub mod queue;
