pub mod scenario;
pub mod util;

pub use scenario::{Expectation, Scenario, ScenarioBuild, ScriptedChallenge, UserActivity};
pub use util::{format_millis, split_csv};
