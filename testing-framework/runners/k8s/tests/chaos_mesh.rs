use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chaos_framework_core::{
    DynError,
    control_plane::{ControlPlane as _, ControlPlaneError},
    experiments::{
        ChaosKind, ExperimentsBuilder, ReadinessCondition, ResourceIdentity, ResourceKind,
    },
    scenario::{ChaosPlugin, FnScenario},
    wait::{PollTimeoutError, poll_until},
};
use chaos_framework_runner_k8s::{K8sClientConfig, KubeControlPlane};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt::TestWriter};

const NAMESPACE: &str = "kube-system";
const WATCH_INTERVAL: Duration = Duration::from_secs(1);
const CREATED_WITHIN: Duration = Duration::from_secs(30);
const REMOVED_WITHIN: Duration = Duration::from_secs(20);
const SCENARIO_DURATION: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct NetworkChaos {
    metadata: ObjectMeta,
    spec: NetworkChaosSpec,
}

#[derive(Serialize)]
struct NetworkChaosSpec {
    action: &'static str,
    mode: &'static str,
    selector: PodSelector,
    delay: Delay,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PodSelector {
    namespaces: Vec<&'static str>,
    label_selectors: BTreeMap<&'static str, &'static str>,
}

#[derive(Serialize)]
struct Delay {
    latency: &'static str,
}

#[derive(Serialize)]
struct Workflow {
    metadata: ObjectMeta,
    spec: WorkflowSpec,
}

#[derive(Serialize)]
struct WorkflowSpec {
    entry: &'static str,
    templates: Vec<Template>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Template {
    name: &'static str,
    template_type: &'static str,
    deadline: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<ScheduleSpec>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleSpec {
    schedule: &'static str,
    #[serde(rename = "type")]
    schedule_type: &'static str,
    concurrency_policy: &'static str,
    pod_chaos: PodChaosSpec,
}

#[derive(Serialize)]
struct PodChaosSpec {
    action: &'static str,
    mode: &'static str,
    selector: PodSelector,
}

fn metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(NAMESPACE.to_owned()),
        ..ObjectMeta::default()
    }
}

fn kube_dns() -> PodSelector {
    PodSelector {
        namespaces: vec![NAMESPACE],
        label_selectors: [("k8s-app", "kube-dns")].into_iter().collect(),
    }
}

fn network_delay(name: &str) -> NetworkChaos {
    NetworkChaos {
        metadata: metadata(name),
        spec: NetworkChaosSpec {
            action: "delay",
            mode: "all",
            selector: kube_dns(),
            delay: Delay { latency: "10ms" },
        },
    }
}

fn kill_coredns_workflow(name: &str) -> Workflow {
    Workflow {
        metadata: metadata(name),
        spec: WorkflowSpec {
            entry: "entry",
            templates: vec![
                Template {
                    name: "entry",
                    template_type: "Serial",
                    deadline: "5m",
                    children: vec!["kill-coredns"],
                    schedule: None,
                },
                Template {
                    name: "kill-coredns",
                    template_type: "Schedule",
                    deadline: "40s",
                    children: Vec::new(),
                    schedule: Some(ScheduleSpec {
                        schedule: "@every 20s",
                        schedule_type: "PodChaos",
                        concurrency_policy: "Forbid",
                        pod_chaos: PodChaosSpec {
                            action: "pod-kill",
                            mode: "one",
                            selector: kube_dns(),
                        },
                    }),
                },
            ],
        },
    }
}

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
      'k8s-app': 'kube-dns'
  delay:
    latency: '10ms'
    correlation: '100'
    jitter: '0ms'
";

const WORKFLOW_YAML: &str = r"
apiVersion: chaos-mesh.org/v1alpha1
kind: Workflow
metadata:
  name: workflow-yaml
  namespace: kube-system
spec:
  entry: entry
  templates:
    - name: entry
      templateType: Serial
      deadline: 240s
      children:
        - workflow-pod-chaos-schedule
    - name: workflow-pod-chaos-schedule
      templateType: Schedule
      deadline: 2m
      schedule:
        schedule: '@every 40s'
        concurrencyPolicy: Allow
        type: 'PodChaos'
        podChaos:
          action: pod-kill
          mode: one
          selector:
            namespaces:
              - kube-system
            labelSelectors:
              'k8s-app': 'kube-dns'
";

fn manifest(file: &str) -> String {
    format!("{}/tests/manifests/{file}", env!("CARGO_MANIFEST_DIR"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(TestWriter::default())
        .try_init();
}

async fn connect(test: &str) -> Option<Arc<KubeControlPlane>> {
    init_tracing();
    match KubeControlPlane::connect(&K8sClientConfig::from_env()).await {
        Ok(control_plane) => Some(Arc::new(control_plane)),
        Err(err) => {
            eprintln!("Skipping {test}: Kubernetes cluster unavailable ({err})");
            None
        }
    }
}

#[derive(Clone)]
struct Expected {
    kind: ResourceKind,
    identity: ResourceIdentity,
}

impl Expected {
    fn new(kind: ChaosKind, name: &str) -> Self {
        Self {
            kind: kind.resource_kind(),
            identity: ResourceIdentity::new(NAMESPACE, name),
        }
    }

    fn readiness(&self) -> ReadinessCondition {
        if self.kind == ChaosKind::Workflow.resource_kind() {
            ReadinessCondition::WORKFLOW_SCHEDULED
        } else {
            ReadinessCondition::ALL_INJECTED
        }
    }
}

/// Watches, from a separate task, for every expected resource to show up.
fn watch_for_creation(
    control_plane: Arc<KubeControlPlane>,
    expected: Vec<Expected>,
) -> JoinHandle<Result<(), PollTimeoutError<ControlPlaneError>>> {
    tokio::spawn(async move {
        poll_until(WATCH_INTERVAL, CREATED_WITHIN, || {
            let control_plane = Arc::clone(&control_plane);
            let expected = expected.clone();
            async move {
                for resource in &expected {
                    control_plane.get(&resource.kind, &resource.identity).await?;
                }
                Ok::<_, ControlPlaneError>(true)
            }
        })
        .await
    })
}

async fn wait_for_removal(
    control_plane: &KubeControlPlane,
    expected: &[Expected],
) -> Result<(), PollTimeoutError<ControlPlaneError>> {
    poll_until(WATCH_INTERVAL, REMOVED_WITHIN, move || async move {
        for resource in expected {
            match control_plane.get(&resource.kind, &resource.identity).await {
                Err(err) if err.is_not_found() => {}
                Ok(_) => return Ok(false),
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    })
    .await
}

/// Runs a short scenario with the declared experiments and checks they are
/// created, ready while the scenario runs, and removed afterwards.
async fn run_with_experiments<F>(
    control_plane: Arc<KubeControlPlane>,
    declare: F,
    expected: Vec<Expected>,
) where
    F: Fn(ExperimentsBuilder) -> ExperimentsBuilder + Send + Sync,
{
    let watcher = watch_for_creation(Arc::clone(&control_plane), expected.clone());

    let body_control_plane = Arc::clone(&control_plane);
    let body_expected = expected.clone();
    let scenario = ChaosPlugin::new(control_plane.clone())
        .with_experiments(declare)
        .apply(FnScenario::new("with-chaos", move || {
            let control_plane = Arc::clone(&body_control_plane);
            let expected = body_expected.clone();
            async move {
                for resource in &expected {
                    let current = control_plane.get(&resource.kind, &resource.identity).await?;
                    if !resource.readiness().is_met_by(&current) {
                        return Err::<(), DynError>(
                            format!("{} is not {}", current.experiment_name(), resource.readiness())
                                .into(),
                        );
                    }
                }
                tokio::time::sleep(SCENARIO_DURATION).await;
                Ok(())
            }
        }));

    let report = scenario
        .run_with_report()
        .await
        .unwrap_or_else(|err| panic!("scenario failed: {err}"));

    watcher
        .await
        .unwrap()
        .unwrap_or_else(|err| panic!("experiments were never created: {err}"));
    assert!(report.is_clean(), "{report}");
    wait_for_removal(&control_plane, &expected)
        .await
        .unwrap_or_else(|err| panic!("experiments were not cleaned up: {err}"));
}

#[tokio::test]
#[ignore = "requires access to a Kubernetes cluster with Chaos Mesh installed"]
async fn network_chaos_from_struct() {
    let Some(control_plane) = connect("network_chaos_from_struct").await else {
        return;
    };

    run_with_experiments(
        control_plane,
        |experiments| experiments.with_network_chaos(&network_delay("scenario-struct")),
        vec![Expected::new(ChaosKind::NetworkChaos, "scenario-struct")],
    )
    .await;
}

#[tokio::test]
#[ignore = "requires access to a Kubernetes cluster with Chaos Mesh installed"]
async fn network_chaos_from_yaml() {
    let Some(control_plane) = connect("network_chaos_from_yaml").await else {
        return;
    };

    run_with_experiments(
        control_plane,
        |experiments| experiments.with_network_chaos_from_yaml(NETWORK_CHAOS_YAML),
        vec![Expected::new(ChaosKind::NetworkChaos, "scenario-yaml")],
    )
    .await;
}

#[tokio::test]
#[ignore = "requires access to a Kubernetes cluster with Chaos Mesh installed"]
async fn network_chaos_from_file() {
    let Some(control_plane) = connect("network_chaos_from_file").await else {
        return;
    };

    run_with_experiments(
        control_plane,
        |experiments| experiments.with_network_chaos_from_file(manifest("scenario-file.yaml")),
        vec![Expected::new(ChaosKind::NetworkChaos, "scenario-file")],
    )
    .await;
}

#[tokio::test]
#[ignore = "requires access to a Kubernetes cluster with Chaos Mesh installed"]
async fn workflow_from_struct() {
    let Some(control_plane) = connect("workflow_from_struct").await else {
        return;
    };

    run_with_experiments(
        control_plane,
        |experiments| experiments.with_workflow(&kill_coredns_workflow("workflow-struct")),
        vec![Expected::new(ChaosKind::Workflow, "workflow-struct")],
    )
    .await;
}

#[tokio::test]
#[ignore = "requires access to a Kubernetes cluster with Chaos Mesh installed"]
async fn workflow_from_yaml() {
    let Some(control_plane) = connect("workflow_from_yaml").await else {
        return;
    };

    run_with_experiments(
        control_plane,
        |experiments| experiments.with_workflow_from_yaml(WORKFLOW_YAML),
        vec![Expected::new(ChaosKind::Workflow, "workflow-yaml")],
    )
    .await;
}

#[tokio::test]
#[ignore = "requires access to a Kubernetes cluster with Chaos Mesh installed"]
async fn workflow_from_file() {
    let Some(control_plane) = connect("workflow_from_file").await else {
        return;
    };

    run_with_experiments(
        control_plane,
        |experiments| experiments.with_workflow_from_file(manifest("workflow-file.yaml")),
        vec![Expected::new(ChaosKind::Workflow, "workflow-file")],
    )
    .await;
}
