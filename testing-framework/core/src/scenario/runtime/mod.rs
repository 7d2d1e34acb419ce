mod cleanup;
mod configurator;
mod guard;

pub use cleanup::{CleanupError, CleanupOutcome, CleanupReport};
pub use configurator::{ConfigureError, ExperimentsConfigurator, LifecycleState, Phase};
pub(crate) use guard::TeardownGuard;
