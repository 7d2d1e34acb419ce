//! Running scenarios with chaos experiments around them.

mod definition;
mod plugin;
mod runtime;

pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use definition::{FnScenario, Scenario};
pub use plugin::{ChaosPlugin, ChaosScenarioOption, ScenarioError, WithExperiments};
pub use runtime::{
    CleanupError, CleanupOutcome, CleanupReport, ConfigureError, ExperimentsConfigurator,
    LifecycleState, Phase,
};
