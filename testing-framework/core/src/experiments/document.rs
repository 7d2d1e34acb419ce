use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::kind::ResourceKind;

/// Annotation Chaos Mesh reads to keep an experiment dormant.
pub const PAUSE_ANNOTATION: &str = "experiment.chaos-mesh.org/pause";
const CONDITION_TRUE: &str = "True";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    namespace: String,
    name: String,
}

impl ResourceIdentity {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Diagnostic name of an experiment, rendered as `[<Kind>]::<namespace>/<name>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExperimentName {
    kind: String,
    identity: ResourceIdentity,
}

impl ExperimentName {
    #[must_use]
    pub fn new(kind: &ResourceKind, identity: &ResourceIdentity) -> Self {
        Self {
            kind: kind.kind().to_owned(),
            identity: identity.clone(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub const fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

impl fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]::{}", self.kind, self.identity)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document is not a mapping")]
    NotAnObject,
    #[error("document is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("document declares `{field}: {found}` but was registered as `{expected}`")]
    KindMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },
}

/// One entry of `status.conditions`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

impl StatusCondition {
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }
}

/// Status condition that marks a resource as accepted and enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessCondition {
    condition_type: &'static str,
}

impl ReadinessCondition {
    /// Every selected target of a single experiment has been injected.
    pub const ALL_INJECTED: Self = Self::new("AllInjected");
    /// A workflow has been picked up by the scheduler.
    pub const WORKFLOW_SCHEDULED: Self = Self::new("Scheduled");

    #[must_use]
    pub const fn new(condition_type: &'static str) -> Self {
        Self { condition_type }
    }

    #[must_use]
    pub const fn condition_type(self) -> &'static str {
        self.condition_type
    }

    /// A missing or malformed status never satisfies the condition.
    #[must_use]
    pub fn is_met_by(self, document: &CanonicalDocument) -> bool {
        document.conditions().is_ok_and(|conditions| {
            conditions.iter().any(|condition| {
                condition.condition_type == self.condition_type && condition.is_true()
            })
        })
    }
}

impl fmt::Display for ReadinessCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.condition_type)
    }
}

/// Kind-tagged resource tree with a fixed identity.
///
/// The tree carries `apiVersion`, `kind`, `metadata`, and whatever free-form
/// `spec`/`status` the resource has. Kind and identity are checked and stamped
/// at construction and cannot be changed afterwards; only annotations are
/// mutable.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalDocument {
    kind: ResourceKind,
    identity: ResourceIdentity,
    object: Map<String, Value>,
}

impl CanonicalDocument {
    pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self, DocumentError> {
        let Value::Object(mut object) = value else {
            return Err(DocumentError::NotAnObject);
        };

        check_type_field(&object, "kind", kind.kind())?;
        check_type_field(&object, "apiVersion", &kind.api_version())?;

        let metadata = object
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or(DocumentError::MissingField("metadata"))?;
        let name = required_str(metadata, "name", "metadata.name")?;
        let namespace = required_str(metadata, "namespace", "metadata.namespace")?;
        let identity = ResourceIdentity::new(namespace, name);

        object.insert("apiVersion".to_owned(), Value::String(kind.api_version()));
        object.insert("kind".to_owned(), Value::String(kind.kind().to_owned()));

        Ok(Self {
            kind,
            identity,
            object,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    #[must_use]
    pub const fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn experiment_name(&self) -> ExperimentName {
        ExperimentName::new(&self.kind, &self.identity)
    }

    #[must_use]
    pub const fn as_object(&self) -> &Map<String, Value> {
        &self.object
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.object.clone())
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }

    #[must_use]
    pub fn spec(&self) -> Option<&Value> {
        self.object.get("spec")
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.object
            .get("metadata")?
            .get("annotations")?
            .get(key)?
            .as_str()
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        let Some(metadata) = self.metadata_mut() else {
            return;
        };
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if !annotations.is_object() {
            *annotations = Value::Object(Map::new());
        }
        if let Some(annotations) = annotations.as_object_mut() {
            annotations.insert(key.to_owned(), Value::String(value.to_owned()));
        }
    }

    pub fn remove_annotation(&mut self, key: &str) -> Option<String> {
        let removed = self
            .metadata_mut()?
            .get_mut("annotations")?
            .as_object_mut()?
            .remove(key)?;
        match removed {
            Value::String(value) => Some(value),
            other => Some(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.annotation(PAUSE_ANNOTATION) == Some("true")
    }

    /// Parses `status.conditions`; an absent status yields no conditions.
    pub fn conditions(&self) -> Result<Vec<StatusCondition>, serde_json::Error> {
        match self.object.get("status").and_then(|status| status.get("conditions")) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(conditions) => Vec::<StatusCondition>::deserialize(conditions),
        }
    }

    /// Replaces `status`; identity and kind are untouched.
    pub fn set_status(&mut self, status: Value) {
        self.object.insert("status".to_owned(), status);
    }

    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.object.get_mut("metadata")?.as_object_mut()
    }
}

fn check_type_field(
    object: &Map<String, Value>,
    field: &'static str,
    expected: &str,
) -> Result<(), DocumentError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(found)) if found == expected || found.is_empty() => Ok(()),
        Some(found) => Err(DocumentError::KindMismatch {
            field,
            expected: expected.to_owned(),
            found: found.as_str().map_or_else(|| found.to_string(), str::to_owned),
        }),
    }
}

fn required_str(
    metadata: &Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<String, DocumentError> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or(DocumentError::MissingField(field))
}
