use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::{
    document::{CanonicalDocument, DocumentError},
    kind::ResourceKind,
};

/// The three forms an experiment can be declared in.
#[derive(Clone, Debug)]
pub enum DefinitionSource {
    /// Already structured; typically produced by serializing a typed value.
    Inline(Value),
    /// Path to a YAML or JSON manifest.
    File(PathBuf),
    /// Embedded YAML or JSON manifest text.
    Text(String),
}

impl DefinitionSource {
    pub fn inline<T>(value: &T) -> Result<Self, ResolutionError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_value(value)
            .map(Self::Inline)
            .map_err(|source| ResolutionError::Encode { source })
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("error opening file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error decoding yaml from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("error converting experiment into a document: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {kind} definition from {origin}: {source}")]
    Document {
        kind: String,
        origin: String,
        #[source]
        source: DocumentError,
    },
}

/// Turns any declaration form into a canonical document tagged with `kind`.
///
/// Only the file form touches the local filesystem; nothing here talks to the
/// cluster.
pub fn resolve(
    kind: &ResourceKind,
    source: DefinitionSource,
) -> Result<CanonicalDocument, ResolutionError> {
    let (origin, value) = match source {
        DefinitionSource::Inline(value) => ("inline value".to_owned(), value),
        DefinitionSource::File(path) => {
            let value = decode_file(&path)?;
            (format!("file {}", path.display()), value)
        }
        DefinitionSource::Text(text) => {
            let origin = "embedded text".to_owned();
            let value = decode_text(&text, &origin)?;
            (origin, value)
        }
    };

    CanonicalDocument::from_value(kind.clone(), value).map_err(|source| ResolutionError::Document {
        kind: kind.kind().to_owned(),
        origin,
        source,
    })
}

fn decode_file(path: &Path) -> Result<Value, ResolutionError> {
    let text = fs::read_to_string(path).map_err(|source| ResolutionError::Io {
        path: path.to_owned(),
        source,
    })?;
    decode_text(&text, &format!("file {}", path.display()))
}

/// YAML is a superset of JSON, so one decoder covers both formats.
fn decode_text(text: &str, origin: &str) -> Result<Value, ResolutionError> {
    serde_yaml::from_str(text).map_err(|source| ResolutionError::Decode {
        origin: origin.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use serde::Serialize;
    use serde_json::json;

    use super::*;
    use crate::experiments::ChaosKind;

    const NETWORK_CHAOS_YAML: &str = r"
apiVersion: chaos-mesh.org/v1alpha1
kind: NetworkChaos
metadata:
  name: scenario-yaml
  namespace: kube-system
spec:
  action: delay
  mode: one
  selector:
    namespaces:
      - kube-system
    labelSelectors:
      k8s-app: kube-dns
  delay:
    latency: '10ms'
    correlation: '100'
    jitter: '0ms'
";

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct NetworkChaos {
        metadata: Metadata,
        spec: NetworkChaosSpec,
    }

    #[derive(Serialize)]
    struct Metadata {
        name: &'static str,
        namespace: &'static str,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct NetworkChaosSpec {
        action: &'static str,
        mode: &'static str,
        selector: Selector,
        delay: Delay,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Selector {
        namespaces: Vec<&'static str>,
        label_selectors: std::collections::BTreeMap<&'static str, &'static str>,
    }

    #[derive(Serialize)]
    struct Delay {
        latency: &'static str,
        correlation: &'static str,
        jitter: &'static str,
    }

    fn typed_network_chaos() -> NetworkChaos {
        NetworkChaos {
            metadata: Metadata {
                name: "scenario-yaml",
                namespace: "kube-system",
            },
            spec: NetworkChaosSpec {
                action: "delay",
                mode: "one",
                selector: Selector {
                    namespaces: vec!["kube-system"],
                    label_selectors: [("k8s-app", "kube-dns")].into_iter().collect(),
                },
                delay: Delay {
                    latency: "10ms",
                    correlation: "100",
                    jitter: "0ms",
                },
            },
        }
    }

    #[test]
    fn all_forms_resolve_to_identical_documents() {
        let kind = ChaosKind::NetworkChaos.resource_kind();

        let from_struct = resolve(
            &kind,
            DefinitionSource::inline(&typed_network_chaos()).unwrap(),
        )
        .unwrap();
        let from_text = resolve(
            &kind,
            DefinitionSource::Text(NETWORK_CHAOS_YAML.to_owned()),
        )
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(NETWORK_CHAOS_YAML.as_bytes()).unwrap();
        let from_file = resolve(&kind, DefinitionSource::File(file.path().to_owned())).unwrap();

        assert_eq!(from_struct, from_text);
        assert_eq!(from_text, from_file);
    }

    #[test]
    fn json_text_is_accepted() {
        let kind = ChaosKind::PodChaos.resource_kind();
        let text = json!({
            "metadata": { "name": "kill", "namespace": "default" },
            "spec": { "action": "pod-kill" }
        })
        .to_string();

        let document = resolve(&kind, DefinitionSource::Text(text)).unwrap();
        assert_eq!(document.identity().name(), "kill");
        assert_eq!(document.spec(), Some(&json!({ "action": "pod-kill" })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let kind = ChaosKind::NetworkChaos.resource_kind();
        let err = resolve(
            &kind,
            DefinitionSource::File(PathBuf::from("./does/not/exist.yaml")),
        )
        .unwrap_err();

        assert!(matches!(err, ResolutionError::Io { .. }));
        assert!(err.to_string().contains("does/not/exist.yaml"));
    }

    #[test]
    fn malformed_text_is_a_decode_error() {
        let kind = ChaosKind::NetworkChaos.resource_kind();
        let err = resolve(
            &kind,
            DefinitionSource::Text("metadata: [unterminated".to_owned()),
        )
        .unwrap_err();

        assert!(matches!(err, ResolutionError::Decode { .. }));
    }

    #[test]
    fn document_errors_carry_origin() {
        let kind = ChaosKind::NetworkChaos.resource_kind();
        let err = resolve(
            &kind,
            DefinitionSource::Text("metadata:\n  name: orphan\n".to_owned()),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ResolutionError::Document {
                source: DocumentError::MissingField("metadata.namespace"),
                ..
            }
        ));
        assert!(err.to_string().contains("embedded text"));
    }
}
