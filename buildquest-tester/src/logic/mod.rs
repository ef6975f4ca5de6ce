pub mod reports;
pub mod seeds;
pub mod simulation;

pub use seeds::resolve_seeds;
pub use simulation::*;
