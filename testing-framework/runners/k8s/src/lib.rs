mod client;
mod control_plane;

use std::sync::Arc;

use chaos_framework_core::scenario::ChaosPlugin;
pub use client::{K8sClientConfig, K8sClientError, KUBECONFIG_ENV, KUBE_CONTEXT_ENV};
pub use control_plane::KubeControlPlane;

/// Connects to the cluster described by `config` and returns a plugin that
/// manages experiments there.
pub async fn chaos_plugin(config: &K8sClientConfig) -> Result<ChaosPlugin, K8sClientError> {
    let control_plane = KubeControlPlane::connect(config).await?;
    Ok(ChaosPlugin::new(Arc::new(control_plane)))
}
