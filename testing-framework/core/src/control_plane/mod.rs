#[cfg(any(test, feature = "mock"))]
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub use memory::{ControlPlaneCall, MemoryControlPlane};

use crate::{
    DynError,
    experiments::{CanonicalDocument, DocumentError, ExperimentName, ResourceIdentity, ResourceKind},
};

/// Errors surfaced by a control plane. "Not found" and "already exists" are
/// distinct so teardown can treat a missing resource as already removed.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("{name} not found")]
    NotFound { name: ExperimentName },
    #[error("{name} already exists")]
    AlreadyExists { name: ExperimentName },
    #[error("{name} was rejected by the control plane: {source}")]
    Rejected {
        name: ExperimentName,
        #[source]
        source: DynError,
    },
    #[error("{name} came back as an invalid document: {source}")]
    InvalidDocument {
        name: ExperimentName,
        #[source]
        source: DocumentError,
    },
}

impl ControlPlaneError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub const fn name(&self) -> &ExperimentName {
        match self {
            Self::NotFound { name }
            | Self::AlreadyExists { name }
            | Self::Rejected { name, .. }
            | Self::InvalidDocument { name, .. } => name,
        }
    }
}

/// Remote API that stores fault-injection resources.
///
/// Implementations are owned by one run and passed in explicitly; there is no
/// process-wide client.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError>;

    async fn get(
        &self,
        kind: &ResourceKind,
        identity: &ResourceIdentity,
    ) -> Result<CanonicalDocument, ControlPlaneError>;

    /// Writes back a document previously returned by [`ControlPlane::get`].
    async fn update(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError>;

    async fn delete(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError>;
}

#[async_trait]
impl<T> ControlPlane for Arc<T>
where
    T: ControlPlane + ?Sized,
{
    async fn create(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        (**self).create(document).await
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        identity: &ResourceIdentity,
    ) -> Result<CanonicalDocument, ControlPlaneError> {
        (**self).get(kind, identity).await
    }

    async fn update(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        (**self).update(document).await
    }

    async fn delete(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        (**self).delete(document).await
    }
}
