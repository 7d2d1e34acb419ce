use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use async_trait::async_trait;
use futures::FutureExt as _;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    DynError, Scenario,
    runtime::{CleanupReport, ConfigureError, ExperimentsConfigurator, TeardownGuard},
};
use crate::{
    control_plane::ControlPlane,
    experiments::{ExperimentsBuilder, ResolutionError},
    wait::ReadinessPolicy,
};

/// Why a wrapped scenario did not pass.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The experiments could not be declared; nothing reached the cluster.
    #[error("invalid experiment declaration: {source}")]
    Declaration {
        #[source]
        source: ResolutionError,
    },
    /// Setup failed and the scenario body was skipped.
    #[error("experiment setup failed: {source}")]
    Configure {
        #[source]
        source: ConfigureError,
        cleanup: CleanupReport,
    },
    #[error("scenario failed: {source}")]
    Scenario {
        #[source]
        source: DynError,
        cleanup: CleanupReport,
    },
}

impl ScenarioError {
    #[must_use]
    pub const fn cleanup(&self) -> Option<&CleanupReport> {
        match self {
            Self::Declaration { .. } => None,
            Self::Configure { cleanup, .. } | Self::Scenario { cleanup, .. } => Some(cleanup),
        }
    }
}

/// Entry point for attaching chaos experiments to scenarios.
#[derive(Clone)]
pub struct ChaosPlugin {
    control_plane: Arc<dyn ControlPlane>,
    readiness: ReadinessPolicy,
}

impl ChaosPlugin {
    #[must_use]
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            control_plane,
            readiness: ReadinessPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    #[must_use]
    pub const fn readiness(&self) -> ReadinessPolicy {
        self.readiness
    }

    /// `declare` is called once per run, so every run gets a fresh registry.
    #[must_use]
    pub fn with_experiments<F>(&self, declare: F) -> ChaosScenarioOption<F>
    where
        F: Fn(ExperimentsBuilder) -> ExperimentsBuilder + Send + Sync,
    {
        ChaosScenarioOption {
            plugin: self.clone(),
            declare,
        }
    }
}

pub struct ChaosScenarioOption<F> {
    plugin: ChaosPlugin,
    declare: F,
}

impl<F> ChaosScenarioOption<F>
where
    F: Fn(ExperimentsBuilder) -> ExperimentsBuilder + Send + Sync,
{
    #[must_use]
    pub fn apply<S: Scenario>(self, scenario: S) -> WithExperiments<S, F> {
        WithExperiments {
            scenario,
            plugin: self.plugin,
            declare: self.declare,
        }
    }
}

/// A scenario that runs with its experiments set up before the body and torn
/// down after it.
pub struct WithExperiments<S, F> {
    scenario: S,
    plugin: ChaosPlugin,
    declare: F,
}

impl<S, F> WithExperiments<S, F>
where
    S: Scenario,
    F: Fn(ExperimentsBuilder) -> ExperimentsBuilder + Send + Sync,
{
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.scenario
    }

    /// Runs the wrapped scenario and reports what teardown did.
    ///
    /// Cleanup runs whenever setup started, including when the body panics;
    /// the panic is resumed afterwards. Dropping the returned future before it
    /// completes hands teardown to a background task on the current runtime.
    pub async fn run_with_report(&self) -> Result<CleanupReport, ScenarioError> {
        let registry = (self.declare)(ExperimentsBuilder::new())
            .build()
            .map_err(|source| ScenarioError::Declaration { source })?;

        let mut teardown = TeardownGuard::new(ExperimentsConfigurator::new(
            Arc::clone(&self.plugin.control_plane),
            self.plugin.readiness,
            &registry,
        ));

        if let Err(source) = teardown.configure().await {
            let cleanup = teardown.finish().await;
            return Err(ScenarioError::Configure { source, cleanup });
        }

        info!(scenario = self.scenario.name(), "running scenario");
        let outcome = AssertUnwindSafe(self.scenario.run()).catch_unwind().await;
        let cleanup = teardown.finish().await;

        match outcome {
            Ok(Ok(())) => Ok(cleanup),
            Ok(Err(source)) => Err(ScenarioError::Scenario { source, cleanup }),
            Err(payload) => {
                warn!(
                    scenario = self.scenario.name(),
                    panic = panic_message(payload.as_ref()),
                    "scenario panicked"
                );
                panic::resume_unwind(payload)
            }
        }
    }
}

#[async_trait]
impl<S, F> Scenario for WithExperiments<S, F>
where
    S: Scenario,
    F: Fn(ExperimentsBuilder) -> ExperimentsBuilder + Send + Sync,
{
    fn name(&self) -> &str {
        self.scenario.name()
    }

    /// A cleanup failure alone does not fail a passing scenario.
    async fn run(&self) -> Result<(), DynError> {
        let report = self.run_with_report().await?;
        if !report.is_clean() {
            warn!(scenario = self.name(), %report, "scenario passed but cleanup failed");
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&'static str>().copied())
        .unwrap_or("unknown panic")
}
