use std::time::Duration;

use anyhow::{Context as _, bail};
use chaos_framework_core::scenario::{FnScenario, Scenario as _};
use chaos_framework_runner_k8s::{K8sClientConfig, chaos_plugin};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SCENARIO_DURATION: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let plugin = chaos_plugin(&K8sClientConfig::from_env())
        .await
        .context("connecting to the cluster")?;

    let scenario = plugin
        .with_experiments(|experiments| {
            experiments
                .with_existing_network_chaos("default", "scenario-two")
                .with_network_chaos(&json!({
                    "metadata": { "name": "scenario-one", "namespace": "default" },
                    "spec": {
                        "action": "delay",
                        "mode": "all",
                        "selector": { "namespaces": ["default"] },
                        "delay": { "latency": "100ms" }
                    }
                }))
                .with_existing_dns_chaos("chaos-testing", "dns-chaos-example")
        })
        .apply(FnScenario::new("one-with-chaos", || async {
            tokio::time::sleep(SCENARIO_DURATION).await;
            Ok::<_, chaos_framework_core::DynError>(())
        }));

    info!(scenario = scenario.name(), "starting");
    let report = scenario
        .run_with_report()
        .await
        .context("running scenario")?;

    if !report.is_clean() {
        bail!("scenario passed but experiments leaked:\n{report}");
    }
    info!(%report, "done");
    Ok(())
}
