use serde::{Deserialize, Serialize};

pub mod runner;
pub mod virtual_user;

pub use runner::{run_scenario, RunOutcome, Runner};
pub use virtual_user::{run_load, LoadProfile, UserTurn, UserWorkload, VuReport};

/// Lifecycle position of a scenario as recorded in its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    /// Built by its factory; nothing has run yet.
    #[default]
    Created,
    /// `setup` succeeded.
    SetUp,
    /// `execute` finished and reported success.
    Executed,
    /// `cleanup` ran after a successful execution.
    CleanedUp,
    /// Setup or execution failed or panicked.
    Failed,
}

impl std::fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScenarioState::Created => "created",
            ScenarioState::SetUp => "set_up",
            ScenarioState::Executed => "executed",
            ScenarioState::CleanedUp => "cleaned_up",
            ScenarioState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
