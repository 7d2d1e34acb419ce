use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use serde_json::json;

use super::{ControlPlane, ControlPlaneError};
use crate::experiments::{
    CanonicalDocument, ChaosKind, ExperimentName, ReadinessCondition, ResourceIdentity,
    ResourceKind,
};

type Key = (ResourceKind, ResourceIdentity);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlPlaneCall {
    Create(ExperimentName),
    Get(ExperimentName),
    Update(ExperimentName),
    Delete(ExperimentName),
}

impl ControlPlaneCall {
    #[must_use]
    pub const fn name(&self) -> &ExperimentName {
        match self {
            Self::Create(name) | Self::Get(name) | Self::Update(name) | Self::Delete(name) => name,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<Key, CanonicalDocument>,
    calls: Vec<ControlPlaneCall>,
    rejected_creates: HashMap<Key, String>,
    rejected_updates: HashMap<Key, String>,
    rejected_deletes: HashMap<Key, String>,
    failing_gets: HashMap<Key, u32>,
    pending_readiness: HashMap<Key, u32>,
    never_ready: HashSet<Key>,
}

/// In-process control plane for exercising the lifecycle without a cluster.
///
/// Created resources report their readiness condition (`AllInjected`, or
/// `Scheduled` for workflows) on the first fetch unless told otherwise.
#[derive(Default)]
pub struct MemoryControlPlane {
    state: Mutex<MemoryState>,
}

impl MemoryControlPlane {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a resource as if somebody else had created it.
    pub fn insert(&self, document: CanonicalDocument) {
        let key = key_of(document.kind(), document.identity());
        self.lock().objects.insert(key, document);
    }

    pub fn reject_create(&self, kind: &ResourceKind, identity: &ResourceIdentity, reason: &str) {
        self.lock()
            .rejected_creates
            .insert(key_of(kind, identity), reason.to_owned());
    }

    pub fn reject_update(&self, kind: &ResourceKind, identity: &ResourceIdentity, reason: &str) {
        self.lock()
            .rejected_updates
            .insert(key_of(kind, identity), reason.to_owned());
    }

    pub fn reject_delete(&self, kind: &ResourceKind, identity: &ResourceIdentity, reason: &str) {
        self.lock()
            .rejected_deletes
            .insert(key_of(kind, identity), reason.to_owned());
    }

    /// The next `times` fetches of the resource fail.
    pub fn fail_gets(&self, kind: &ResourceKind, identity: &ResourceIdentity, times: u32) {
        self.lock()
            .failing_gets
            .insert(key_of(kind, identity), times);
    }

    /// The readiness condition shows up on fetch number `fetches + 1`.
    pub fn ready_after(&self, kind: &ResourceKind, identity: &ResourceIdentity, fetches: u32) {
        self.lock()
            .pending_readiness
            .insert(key_of(kind, identity), fetches);
    }

    pub fn never_ready(&self, kind: &ResourceKind, identity: &ResourceIdentity) {
        self.lock().never_ready.insert(key_of(kind, identity));
    }

    /// Removes a resource behind the orchestrator's back.
    pub fn remove(
        &self,
        kind: &ResourceKind,
        identity: &ResourceIdentity,
    ) -> Option<CanonicalDocument> {
        self.lock().objects.remove(&key_of(kind, identity))
    }

    #[must_use]
    pub fn contains(&self, kind: &ResourceKind, identity: &ResourceIdentity) -> bool {
        self.lock().objects.contains_key(&key_of(kind, identity))
    }

    #[must_use]
    pub fn stored(
        &self,
        kind: &ResourceKind,
        identity: &ResourceIdentity,
    ) -> Option<CanonicalDocument> {
        self.lock().objects.get(&key_of(kind, identity)).cloned()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.lock().calls.clone()
    }

    /// Calls other than fetches, which readiness polling produces in bulk.
    #[must_use]
    pub fn mutations(&self) -> Vec<ControlPlaneCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| !matches!(call, ControlPlaneCall::Get(_)))
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key_of(kind: &ResourceKind, identity: &ResourceIdentity) -> Key {
    (kind.clone(), identity.clone())
}

fn readiness_for(kind: &ResourceKind) -> ReadinessCondition {
    if *kind == ChaosKind::Workflow.resource_kind() {
        ReadinessCondition::WORKFLOW_SCHEDULED
    } else {
        ReadinessCondition::ALL_INJECTED
    }
}

fn mark_ready(document: &mut CanonicalDocument) {
    let condition = readiness_for(document.kind());
    document.set_status(json!({
        "conditions": [{ "type": condition.condition_type(), "status": "True" }]
    }));
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn create(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        let name = document.experiment_name();
        let key = key_of(document.kind(), document.identity());
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Create(name.clone()));

        if let Some(reason) = state.rejected_creates.get(&key) {
            return Err(ControlPlaneError::Rejected {
                name,
                source: reason.clone().into(),
            });
        }
        if state.objects.contains_key(&key) {
            return Err(ControlPlaneError::AlreadyExists { name });
        }

        let mut stored = document.clone();
        stored.set_status(json!({ "conditions": [] }));
        state.objects.insert(key, stored);
        Ok(())
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        identity: &ResourceIdentity,
    ) -> Result<CanonicalDocument, ControlPlaneError> {
        let name = ExperimentName::new(kind, identity);
        let key = key_of(kind, identity);
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Get(name.clone()));

        if let Some(remaining) = state.failing_gets.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ControlPlaneError::Rejected {
                    name,
                    source: "transient fetch failure".into(),
                });
            }
        }

        let becomes_ready = if state.never_ready.contains(&key) {
            false
        } else {
            match state.pending_readiness.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    false
                }
                _ => true,
            }
        };

        let document = state
            .objects
            .get_mut(&key)
            .ok_or(ControlPlaneError::NotFound { name })?;
        if becomes_ready && !readiness_for(kind).is_met_by(document) {
            mark_ready(document);
        }
        Ok(document.clone())
    }

    async fn update(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        let name = document.experiment_name();
        let key = key_of(document.kind(), document.identity());
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Update(name.clone()));

        if let Some(reason) = state.rejected_updates.get(&key) {
            return Err(ControlPlaneError::Rejected {
                name,
                source: reason.clone().into(),
            });
        }
        let stored = state
            .objects
            .get_mut(&key)
            .ok_or(ControlPlaneError::NotFound { name })?;
        *stored = document.clone();
        Ok(())
    }

    async fn delete(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        let name = document.experiment_name();
        let key = key_of(document.kind(), document.identity());
        let mut state = self.lock();
        state.calls.push(ControlPlaneCall::Delete(name.clone()));

        if let Some(reason) = state.rejected_deletes.get(&key) {
            return Err(ControlPlaneError::Rejected {
                name,
                source: reason.clone().into(),
            });
        }
        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or(ControlPlaneError::NotFound { name })
    }
}
