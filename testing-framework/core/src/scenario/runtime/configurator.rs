use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::cleanup::{CleanupError, CleanupOutcome, CleanupReport};
use crate::{
    control_plane::{ControlPlane, ControlPlaneError},
    experiments::{
        BorrowedReference, CanonicalDocument, ExperimentName, PAUSE_ANNOTATION,
        ReadinessCondition, Registry,
    },
    wait::{PollTimeoutError, ReadinessPolicy, poll_until},
};

const PAUSED: &str = "true";

#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("failed to create {name}: {source}")]
    Create {
        name: ExperimentName,
        #[source]
        source: ControlPlaneError,
    },
    #[error("{name} never reported {condition}: {source}")]
    NotReady {
        name: ExperimentName,
        condition: ReadinessCondition,
        #[source]
        source: PollTimeoutError<ControlPlaneError>,
    },
    #[error("failed to activate {name}: {source}")]
    Activate {
        name: ExperimentName,
        #[source]
        source: ControlPlaneError,
    },
    #[error("experiments can only be configured once per run (currently {phase})")]
    AlreadyStarted { phase: Phase },
}

impl ConfigureError {
    /// Control-plane failure behind this error, if the control plane produced
    /// one directly.
    #[must_use]
    pub const fn control_plane_error(&self) -> Option<&ControlPlaneError> {
        match self {
            Self::Create { source, .. } | Self::Activate { source, .. } => Some(source),
            Self::NotReady { .. } | Self::AlreadyStarted { .. } => None,
        }
    }
}

/// Where a run is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Configuring,
    Configured,
    ConfigureFailed,
    CleaningUp,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
            Self::ConfigureFailed => "configure failed",
            Self::CleaningUp => "cleaning up",
            Self::Done => "done",
        };
        f.write_str(phase)
    }
}

/// Progress of a single definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Declared,
    Created,
    Ready,
    Active,
    TornDown,
}

#[derive(Debug)]
enum Target {
    Owned(CanonicalDocument),
    Borrowed(BorrowedReference),
    Workflow(CanonicalDocument),
}

impl Target {
    fn name(&self) -> ExperimentName {
        match self {
            Self::Owned(document) | Self::Workflow(document) => document.experiment_name(),
            Self::Borrowed(reference) => reference.experiment_name(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    target: Target,
    state: LifecycleState,
    /// The create call failed in a way that does not rule out the server
    /// having stored the resource.
    create_unconfirmed: bool,
}

impl Entry {
    const fn new(target: Target) -> Self {
        Self {
            target,
            state: LifecycleState::Declared,
            create_unconfirmed: false,
        }
    }

    /// Whether teardown still has something to delete or pause.
    const fn needs_cleanup(&self) -> bool {
        match (&self.target, self.state) {
            (_, LifecycleState::TornDown) => false,
            (Target::Borrowed(_), state) => !matches!(state, LifecycleState::Declared),
            (_, LifecycleState::Declared) => self.create_unconfirmed,
            _ => true,
        }
    }
}

/// Drives the experiments of one run against a control plane: creates and
/// activates them before the scenario, removes or pauses them afterwards.
///
/// Owned experiments go first (kind by kind), then borrowed references, then
/// workflows. Teardown walks the same order.
pub struct ExperimentsConfigurator {
    control_plane: Arc<dyn ControlPlane>,
    readiness: ReadinessPolicy,
    entries: Vec<Entry>,
    phase: Phase,
}

impl ExperimentsConfigurator {
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        readiness: ReadinessPolicy,
        registry: &Registry,
    ) -> Self {
        let entries = registry
            .owned()
            .cloned()
            .map(Target::Owned)
            .chain(registry.borrowed().cloned().map(Target::Borrowed))
            .chain(registry.workflows().iter().cloned().map(Target::Workflow))
            .map(Entry::new)
            .collect();

        Self {
            control_plane,
            readiness,
            entries,
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current state of every definition, in setup order.
    pub fn states(&self) -> impl Iterator<Item = (ExperimentName, LifecycleState)> + '_ {
        self.entries
            .iter()
            .map(|entry| (entry.target.name(), entry.state))
    }

    /// Definitions that teardown has not dealt with yet: created or activated
    /// by this run and not yet removed or paused again.
    pub fn outstanding(&self) -> impl Iterator<Item = ExperimentName> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.needs_cleanup())
            .map(|entry| entry.target.name())
    }

    /// Creates owned experiments and workflows and waits for each to become
    /// ready, then activates borrowed ones.
    ///
    /// The first failure stops setup; whatever was already created is left
    /// for [`Self::cleanup`].
    pub async fn configure(&mut self) -> Result<(), ConfigureError> {
        if self.phase != Phase::Idle {
            return Err(ConfigureError::AlreadyStarted { phase: self.phase });
        }
        self.phase = Phase::Configuring;

        let control_plane = Arc::clone(&self.control_plane);
        let readiness = self.readiness;
        for entry in &mut self.entries {
            if let Err(err) = configure_entry(control_plane.as_ref(), readiness, entry).await {
                entry.create_unconfirmed = matches!(
                    &err,
                    ConfigureError::Create { source, .. } if !source.is_already_exists()
                );
                error!(error = %err, "aborting experiment setup");
                self.phase = Phase::ConfigureFailed;
                return Err(err);
            }
        }

        for entry in &mut self.entries {
            entry.state = LifecycleState::Active;
        }
        self.phase = Phase::Configured;
        info!(experiments = self.entries.len(), "experiments configured");
        Ok(())
    }

    /// Deletes every owned experiment and workflow this run created and
    /// pauses every borrowed one. Never deletes a borrowed resource.
    ///
    /// A definition whose create failed is still deleted, unless the failure
    /// was that the resource already existed: that one belongs to somebody
    /// else. Every definition is attempted even if earlier ones fail. Resources
    /// that are already gone count as removed, so calling this again is
    /// harmless.
    pub async fn cleanup(&mut self) -> CleanupReport {
        self.phase = Phase::CleaningUp;

        let mut report = CleanupReport::default();
        for entry in &mut self.entries {
            let outcome = cleanup_entry(self.control_plane.as_ref(), entry).await;
            if let CleanupOutcome::Failed(err) = &outcome {
                warn!(error = %err, "experiment cleanup failed");
            }
            report.push(outcome);
        }

        self.phase = Phase::Done;
        if report.is_clean() {
            info!(experiments = report.outcomes().len(), "experiments cleaned up");
        } else {
            error!(%report, "experiments leaked");
        }
        report
    }
}

async fn configure_entry(
    control_plane: &dyn ControlPlane,
    readiness: ReadinessPolicy,
    entry: &mut Entry,
) -> Result<(), ConfigureError> {
    match &entry.target {
        Target::Owned(document) => {
            create_and_wait(
                control_plane,
                readiness,
                document,
                ReadinessCondition::ALL_INJECTED,
                &mut entry.state,
            )
            .await
        }
        Target::Workflow(document) => {
            create_and_wait(
                control_plane,
                readiness,
                document,
                ReadinessCondition::WORKFLOW_SCHEDULED,
                &mut entry.state,
            )
            .await
        }
        Target::Borrowed(reference) => {
            activate(control_plane, reference).await?;
            entry.state = LifecycleState::Ready;
            Ok(())
        }
    }
}

async fn create_and_wait(
    control_plane: &dyn ControlPlane,
    readiness: ReadinessPolicy,
    document: &CanonicalDocument,
    condition: ReadinessCondition,
    state: &mut LifecycleState,
) -> Result<(), ConfigureError> {
    let name = document.experiment_name();

    control_plane
        .create(document)
        .await
        .map_err(|source| ConfigureError::Create {
            name: name.clone(),
            source,
        })?;
    *state = LifecycleState::Created;
    info!(%name, "created");

    poll_until(readiness.interval(), readiness.timeout(), move || async move {
        let current = control_plane
            .get(document.kind(), document.identity())
            .await?;
        Ok::<_, ControlPlaneError>(condition.is_met_by(&current))
    })
    .await
    .map_err(|source| ConfigureError::NotReady {
        name: name.clone(),
        condition,
        source,
    })?;
    *state = LifecycleState::Ready;
    info!(%name, %condition, "ready");
    Ok(())
}

/// Readiness is not checked again after unpausing.
async fn activate(
    control_plane: &dyn ControlPlane,
    reference: &BorrowedReference,
) -> Result<(), ConfigureError> {
    let name = reference.experiment_name();
    let activate_err = |source| ConfigureError::Activate {
        name: name.clone(),
        source,
    };

    let mut current = control_plane
        .get(reference.kind(), reference.identity())
        .await
        .map_err(activate_err)?;

    if current.remove_annotation(PAUSE_ANNOTATION).is_none() {
        debug!(%name, "not paused, leaving as is");
        return Ok(());
    }
    control_plane.update(&current).await.map_err(activate_err)?;
    info!(%name, "unpaused");
    Ok(())
}

async fn cleanup_entry(control_plane: &dyn ControlPlane, entry: &mut Entry) -> CleanupOutcome {
    match &entry.target {
        Target::Owned(document) | Target::Workflow(document) => {
            let name = document.experiment_name();
            if !entry.needs_cleanup() {
                return CleanupOutcome::Skipped(name);
            }

            match control_plane.delete(document).await {
                Ok(()) => {
                    entry.state = LifecycleState::TornDown;
                    info!(%name, "deleted");
                    CleanupOutcome::Deleted(name)
                }
                Err(err) if err.is_not_found() => {
                    entry.state = LifecycleState::TornDown;
                    debug!(%name, "already deleted");
                    CleanupOutcome::AlreadyGone(name)
                }
                Err(source) => CleanupOutcome::Failed(CleanupError::Delete { name, source }),
            }
        }
        Target::Borrowed(reference) => {
            let outcome = pause(control_plane, reference).await;
            if !matches!(outcome, CleanupOutcome::Failed(_)) {
                entry.state = LifecycleState::TornDown;
            }
            outcome
        }
    }
}

async fn pause(control_plane: &dyn ControlPlane, reference: &BorrowedReference) -> CleanupOutcome {
    let name = reference.experiment_name();

    let mut current = match control_plane
        .get(reference.kind(), reference.identity())
        .await
    {
        Ok(current) => current,
        Err(err) if err.is_not_found() => {
            warn!(%name, "borrowed experiment disappeared before it could be paused");
            return CleanupOutcome::AlreadyGone(name);
        }
        Err(source) => return CleanupOutcome::Failed(CleanupError::Pause { name, source }),
    };

    if current.is_paused() {
        debug!(%name, "already paused");
        return CleanupOutcome::Paused(name);
    }

    current.set_annotation(PAUSE_ANNOTATION, PAUSED);
    match control_plane.update(&current).await {
        Ok(()) => {
            info!(%name, "paused");
            CleanupOutcome::Paused(name)
        }
        Err(err) if err.is_not_found() => CleanupOutcome::AlreadyGone(name),
        Err(source) => CleanupOutcome::Failed(CleanupError::Pause { name, source }),
    }
}
