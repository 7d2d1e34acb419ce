//! Declaration side of a chaos run: kinds, canonical documents, and the
//! registry that groups them.

mod document;
mod kind;
mod registry;
mod resolve;

pub use document::{
    CanonicalDocument, DocumentError, ExperimentName, PAUSE_ANNOTATION, ReadinessCondition,
    ResourceIdentity, StatusCondition,
};
pub use kind::{CHAOS_MESH_GROUP, CHAOS_MESH_VERSION, ChaosKind, ResourceKind};
pub use registry::{BorrowedReference, ExperimentDefinition, ExperimentsBuilder, Registry};
pub use resolve::{DefinitionSource, ResolutionError, resolve};
