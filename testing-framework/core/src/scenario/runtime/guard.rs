use tokio::runtime::Handle;
use tracing::{error, warn};

use super::{
    cleanup::CleanupReport,
    configurator::{ConfigureError, ExperimentsConfigurator, Phase},
};

/// Holds the configurator of a run until its teardown has completed.
///
/// If the run is dropped before that, for example because the caller timed it
/// out, teardown is spawned onto the current runtime. Without a runtime the
/// experiments left behind are logged instead.
pub(crate) struct TeardownGuard {
    configurator: Option<ExperimentsConfigurator>,
}

impl TeardownGuard {
    pub(crate) const fn new(configurator: ExperimentsConfigurator) -> Self {
        Self {
            configurator: Some(configurator),
        }
    }

    pub(crate) async fn configure(&mut self) -> Result<(), ConfigureError> {
        match self.configurator.as_mut() {
            Some(configurator) => configurator.configure().await,
            None => Ok(()),
        }
    }

    /// Runs teardown and disarms the guard once it has returned.
    pub(crate) async fn finish(mut self) -> CleanupReport {
        let report = match self.configurator.as_mut() {
            Some(configurator) => configurator.cleanup().await,
            None => CleanupReport::default(),
        };
        self.configurator = None;
        report
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(mut configurator) = self.configurator.take() else {
            return;
        };
        if configurator.phase() == Phase::Idle {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                warn!(
                    outstanding = configurator.outstanding().count(),
                    "run dropped before teardown, cleaning up in the background"
                );
                handle.spawn(async move {
                    configurator.cleanup().await;
                });
            }
            Err(_) => {
                for name in configurator.outstanding() {
                    error!(%name, "run dropped outside a runtime, experiment left behind");
                }
            }
        }
    }
}
