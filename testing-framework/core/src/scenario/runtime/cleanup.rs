use std::fmt;

use thiserror::Error;

use crate::{control_plane::ControlPlaneError, experiments::ExperimentName};

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to delete {name}: {source}")]
    Delete {
        name: ExperimentName,
        #[source]
        source: ControlPlaneError,
    },
    #[error("failed to pause {name}: {source}")]
    Pause {
        name: ExperimentName,
        #[source]
        source: ControlPlaneError,
    },
}

impl CleanupError {
    #[must_use]
    pub const fn name(&self) -> &ExperimentName {
        match self {
            Self::Delete { name, .. } | Self::Pause { name, .. } => name,
        }
    }
}

/// What teardown did with a single definition.
#[derive(Debug)]
pub enum CleanupOutcome {
    Deleted(ExperimentName),
    /// The resource was already gone, which counts as removed.
    AlreadyGone(ExperimentName),
    Paused(ExperimentName),
    /// Never created by this run, or removed by an earlier cleanup.
    Skipped(ExperimentName),
    Failed(CleanupError),
}

impl CleanupOutcome {
    #[must_use]
    pub const fn name(&self) -> &ExperimentName {
        match self {
            Self::Deleted(name)
            | Self::AlreadyGone(name)
            | Self::Paused(name)
            | Self::Skipped(name) => name,
            Self::Failed(err) => err.name(),
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&CleanupError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Per-definition results of one teardown pass, in the order they were
/// attempted.
#[derive(Debug, Default)]
pub struct CleanupReport {
    outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    pub(crate) fn push(&mut self, outcome: CleanupOutcome) {
        self.outcomes.push(outcome);
    }

    #[must_use]
    pub fn outcomes(&self) -> &[CleanupOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupError> {
        self.outcomes.iter().filter_map(CleanupOutcome::error)
    }

    #[must_use]
    pub fn first_error(&self) -> Option<&CleanupError> {
        self.failures().next()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.first_error().is_none()
    }

    #[must_use]
    pub fn into_outcomes(self) -> Vec<CleanupOutcome> {
        self.outcomes
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failures().count();
        if failures == 0 {
            return write!(f, "{} experiments cleaned up", self.outcomes.len());
        }

        write!(
            f,
            "{failures} of {} experiments failed to clean up",
            self.outcomes.len()
        )?;
        for err in self.failures() {
            write!(f, "\n  {err}")?;
        }
        Ok(())
    }
}
