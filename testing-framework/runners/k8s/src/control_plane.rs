use async_trait::async_trait;
use chaos_framework_core::{
    control_plane::{ControlPlane, ControlPlaneError},
    experiments::{CanonicalDocument, ExperimentName, ResourceIdentity, ResourceKind},
};
use kube::{
    Client, Error as KubeError,
    api::{Api, DeleteParams, DynamicObject, PostParams},
    discovery::ApiResource,
};
use tracing::debug;

use crate::client::{K8sClientConfig, K8sClientError};

/// Stores experiments as custom resources through the Kubernetes API.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: &K8sClientConfig) -> Result<Self, K8sClientError> {
        config.connect().await.map(Self::new)
    }

    fn api(&self, kind: &ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource(kind))
    }
}

fn api_resource(kind: &ResourceKind) -> ApiResource {
    ApiResource {
        group: kind.group().to_owned(),
        version: kind.version().to_owned(),
        api_version: kind.api_version(),
        kind: kind.kind().to_owned(),
        plural: kind.plural().to_owned(),
    }
}

fn to_object(document: &CanonicalDocument) -> Result<DynamicObject, ControlPlaneError> {
    serde_json::from_value(document.to_value()).map_err(|source| ControlPlaneError::Rejected {
        name: document.experiment_name(),
        source: source.into(),
    })
}

fn to_document(
    kind: &ResourceKind,
    name: ExperimentName,
    object: &DynamicObject,
) -> Result<CanonicalDocument, ControlPlaneError> {
    let value = match serde_json::to_value(object) {
        Ok(value) => value,
        Err(source) => {
            return Err(ControlPlaneError::Rejected {
                name,
                source: source.into(),
            })
        }
    };
    CanonicalDocument::from_value(kind.clone(), value)
        .map_err(|source| ControlPlaneError::InvalidDocument { name, source })
}

fn map_kube_error(name: ExperimentName, err: KubeError) -> ControlPlaneError {
    match err {
        KubeError::Api(response) if response.code == 404 => ControlPlaneError::NotFound { name },
        other => ControlPlaneError::Rejected {
            name,
            source: other.into(),
        },
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn create(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        let name = document.experiment_name();
        let identity = document.identity();
        let object = to_object(document)?;

        debug!(%name, "creating");
        match self
            .api(document.kind(), identity.namespace())
            .create(&PostParams::default(), &object)
            .await
        {
            Ok(_) => Ok(()),
            Err(KubeError::Api(response)) if response.code == 409 => {
                Err(ControlPlaneError::AlreadyExists { name })
            }
            Err(err) => Err(map_kube_error(name, err)),
        }
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        identity: &ResourceIdentity,
    ) -> Result<CanonicalDocument, ControlPlaneError> {
        let name = ExperimentName::new(kind, identity);
        let object = self
            .api(kind, identity.namespace())
            .get(identity.name())
            .await
            .map_err(|err| map_kube_error(name.clone(), err))?;
        to_document(kind, name, &object)
    }

    async fn update(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        let name = document.experiment_name();
        let identity = document.identity();
        let object = to_object(document)?;

        debug!(%name, "updating");
        self.api(document.kind(), identity.namespace())
            .replace(identity.name(), &PostParams::default(), &object)
            .await
            .map(|_| ())
            .map_err(|err| map_kube_error(name, err))
    }

    async fn delete(&self, document: &CanonicalDocument) -> Result<(), ControlPlaneError> {
        let name = document.experiment_name();
        let identity = document.identity();

        debug!(%name, "deleting");
        self.api(document.kind(), identity.namespace())
            .delete(identity.name(), &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|err| map_kube_error(name, err))
    }
}

#[cfg(test)]
mod tests {
    use chaos_framework_core::experiments::ChaosKind;
    use kube::core::ErrorResponse;
    use serde_json::json;

    use super::*;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(ErrorResponse {
            status: "Failure".to_owned(),
            message: "rejected".to_owned(),
            reason: "Test".to_owned(),
            code,
        })
    }

    fn name() -> ExperimentName {
        ExperimentName::new(
            &ChaosKind::NetworkChaos.resource_kind(),
            &ResourceIdentity::new("kube-system", "delay"),
        )
    }

    #[test]
    fn api_resource_matches_kind() {
        let resource = api_resource(&ChaosKind::IoChaos.resource_kind());

        assert_eq!(resource.group, "chaos-mesh.org");
        assert_eq!(resource.version, "v1alpha1");
        assert_eq!(resource.api_version, "chaos-mesh.org/v1alpha1");
        assert_eq!(resource.kind, "IOChaos");
        assert_eq!(resource.plural, "iochaos");
    }

    #[test]
    fn not_found_is_distinguished() {
        assert!(map_kube_error(name(), api_error(404)).is_not_found());
        assert!(matches!(
            map_kube_error(name(), api_error(409)),
            ControlPlaneError::Rejected { .. }
        ));
    }

    #[test]
    fn documents_survive_the_dynamic_object_round_trip() {
        let kind = ChaosKind::NetworkChaos.resource_kind();
        let document = CanonicalDocument::from_value(
            kind.clone(),
            json!({
                "metadata": {
                    "name": "delay",
                    "namespace": "kube-system",
                    "annotations": { "experiment.chaos-mesh.org/pause": "true" }
                },
                "spec": { "action": "delay", "mode": "one" },
                "status": { "conditions": [{ "type": "AllInjected", "status": "True" }] }
            }),
        )
        .unwrap();

        let object = to_object(&document).unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("delay"));
        assert_eq!(object.data["spec"]["action"], "delay");

        let back = to_document(&kind, name(), &object).unwrap();
        assert!(back.is_paused());
        assert_eq!(back.spec(), document.spec());
        assert_eq!(back.conditions().unwrap().len(), 1);
    }
}
