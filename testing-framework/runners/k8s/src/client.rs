use std::{env, path::PathBuf, time::Duration};

use kube::{
    Client, Config,
    config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError},
};
use thiserror::Error;
use tracing::debug;

pub const KUBECONFIG_ENV: &str = "CHAOS_KUBECONFIG";
pub const KUBE_CONTEXT_ENV: &str = "CHAOS_KUBE_CONTEXT";

#[derive(Debug, Error)]
pub enum K8sClientError {
    #[error("failed to load kubeconfig: {source}")]
    Kubeconfig {
        #[source]
        source: KubeconfigError,
    },
    #[error("failed to infer kubernetes config: {source}")]
    Infer {
        #[source]
        source: InferConfigError,
    },
    #[error("failed to initialise kubernetes client: {source}")]
    ClientInit {
        #[source]
        source: kube::Error,
    },
}

/// How to reach the cluster that stores the experiments.
///
/// With neither a kubeconfig path nor a context, the usual discovery applies:
/// in-cluster service account, then `$KUBECONFIG`, then `~/.kube/config`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct K8sClientConfig {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl K8sClientConfig {
    /// Reads `CHAOS_KUBECONFIG` and `CHAOS_KUBE_CONTEXT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            kubeconfig: non_empty(KUBECONFIG_ENV).map(PathBuf::from),
            context: non_empty(KUBE_CONTEXT_ENV),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub async fn connect(&self) -> Result<Client, K8sClientError> {
        let mut config = self.load().await?;
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            config.read_timeout = Some(timeout);
        }

        debug!(cluster_url = %config.cluster_url, "connecting to kubernetes");
        Client::try_from(config).map_err(|source| K8sClientError::ClientInit { source })
    }

    async fn load(&self) -> Result<Config, K8sClientError> {
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..KubeConfigOptions::default()
        };

        match &self.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|source| K8sClientError::Kubeconfig { source })?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|source| K8sClientError::Kubeconfig { source })
            }
            None if self.context.is_some() => Config::from_kubeconfig(&options)
                .await
                .map_err(|source| K8sClientError::Kubeconfig { source }),
            None => Config::infer()
                .await
                .map_err(|source| K8sClientError::Infer { source }),
        }
    }
}
