use crate::{
    core::Prefixed,
    k8s::{
        self, Api, ApiResource, ConfigMap, DynamicObject, GroupVersionKind, Label, ResourceType,
    },
    opa,
    sync::{
        classify::{POLICY_LABEL_KEY, POLICY_LABEL_VALUE},
        BackoffConfig, Classifier, ClassifierConfig, ContentSync, Mirror, Reconciler, SyncMetrics,
    },
    ApiAnnotator, ApiWatcher,
};
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use prometheus_client::registry::Registry;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "kube-mgmt",
    about = "Loads policies and data from Kubernetes into Open Policy Agent"
)]
pub struct Args {
    #[clap(long, default_value = "kube_mgmt=info,warn", env = "KUBE_MGMT_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Base URL of the OPA API.
    #[clap(long, default_value = "http://localhost:8181/v1")]
    opa_url: String,

    /// File containing a bearer token for the OPA API.
    #[clap(long)]
    opa_auth_token_file: Option<PathBuf>,

    #[clap(long, default_value = "10000")]
    opa_timeout_ms: u64,

    /// Data path under which replicated resources are stored.
    #[clap(long, default_value = "kubernetes")]
    replicate_path: String,

    /// Replicate a namespaced resource type: `[group/]version/resource[:namespace]`.
    #[clap(long = "replicate")]
    replicate: Vec<Namespaced>,

    /// Replicate a cluster-scoped resource type: `[group/]version/resource`.
    #[clap(long = "replicate-cluster")]
    replicate_cluster: Vec<ClusterScoped>,

    /// Namespaces to load policies and data from; `*` loads from all of them.
    #[clap(long, default_value = "opa", value_delimiter = ',')]
    policies: Vec<String>,

    #[clap(long, default_value = "true", action = ArgAction::Set)]
    enable_policies: bool,

    #[clap(long, default_value = "true", action = ArgAction::Set)]
    enable_data: bool,

    /// Only load ConfigMaps carrying the policy label as policies.
    #[clap(long)]
    require_policy_label: bool,

    #[clap(long, default_value = POLICY_LABEL_KEY)]
    policy_label: String,

    #[clap(long, default_value = POLICY_LABEL_VALUE)]
    policy_value: String,

    /// Load ConfigMaps carrying the policy label from any namespace when the
    /// label is not required.
    #[clap(long)]
    policy_label_bypasses_namespace: bool,

    #[clap(long, default_value = "1000")]
    backoff_min_ms: u64,

    #[clap(long, default_value = "30000")]
    backoff_max_ms: u64,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,
}

#[derive(Clone, Debug)]
struct Namespaced(ResourceType);

#[derive(Clone, Debug)]
struct ClusterScoped(ResourceType);

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            opa_url,
            opa_auth_token_file,
            opa_timeout_ms,
            replicate_path,
            replicate,
            replicate_cluster,
            policies,
            enable_policies,
            enable_data,
            require_policy_label,
            policy_label,
            policy_value,
            policy_label_bypasses_namespace,
            backoff_min_ms,
            backoff_max_ms,
            patch_timeout_ms,
        } = self;

        if backoff_min_ms > backoff_max_ms {
            bail!("--backoff-min-ms must not exceed --backoff-max-ms");
        }
        let backoff = BackoffConfig {
            min: Duration::from_millis(backoff_min_ms),
            max: Duration::from_millis(backoff_max_ms),
        };

        let token = match opa_auth_token_file {
            Some(path) => {
                let token = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Some(token.trim().to_string())
            }
            None => None,
        };
        let opa = opa::Client::new(opa::ClientConfig {
            url: opa_url,
            token,
            timeout: Duration::from_millis(opa_timeout_ms),
        })?;

        let classifier = Classifier::new(ClassifierConfig {
            namespaces: policies,
            require_policy_label,
            enable_policies,
            enable_data,
            policy_label: Label::new(policy_label, policy_value),
            policy_label_bypasses_namespace,
        });

        let mut prom = <Registry>::default();
        let metrics = SyncMetrics::register(prom.sub_registry_with_prefix("sync"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;
        let client = runtime.client();

        // Spawn a reconciler for each replicated resource type.
        let resources = replicate
            .into_iter()
            .map(|Namespaced(rt)| rt)
            .chain(replicate_cluster.into_iter().map(|ClusterScoped(rt)| rt));
        for rt in resources {
            let api = dynamic_api(client.clone(), &rt);
            let sink = Prefixed::new(opa::DataSink::new(opa.clone()), &replicate_path)
                .nest(&rt.resource);
            info!(resource = %rt, path = %sink.prefix(), "Replicating");
            let reconciler = Reconciler::new(
                &rt,
                ApiWatcher::new(api),
                Mirror::new(sink),
                backoff,
                metrics.resource(&rt),
            );
            tokio::spawn(
                reconciler
                    .run(runtime.shutdown_handle())
                    .instrument(info_span!("replicate", resource = %rt)),
            );
        }

        // Spawn a reconciler for ConfigMaps in each policy namespace.
        if enable_policies || enable_data {
            info!(
                namespaces = ?classifier.config().namespaces,
                policy_label = %classifier.config().policy_label,
                "Loading ConfigMaps"
            );
            for ns in configmap_namespaces(classifier.config()) {
                let api = match ns.as_deref() {
                    Some(ns) => Api::<ConfigMap>::namespaced(client.clone(), ns),
                    None => Api::<ConfigMap>::all(client.clone()),
                };
                let resource = match ns.as_deref() {
                    Some(ns) => format!("configmaps:{ns}"),
                    None => "configmaps".to_string(),
                };
                let sync = ContentSync::new(
                    classifier.clone(),
                    opa::PolicySink::new(opa.clone()),
                    opa::DataSink::new(opa.clone()),
                    ApiAnnotator::new(client.clone(), Duration::from_millis(patch_timeout_ms)),
                );
                let reconciler = Reconciler::new(
                    &resource,
                    ApiWatcher::new(api),
                    sync,
                    backoff,
                    metrics.resource(&resource),
                );
                tokio::spawn(
                    reconciler
                        .run(runtime.shutdown_handle())
                        .instrument(info_span!("configmaps", ns = ns.as_deref().unwrap_or("*"))),
                );
            }
        }

        // Block the main thread on the shutdown signal. Once it fires, wait
        // for the reconcilers to stop before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Watches are scoped to each selected namespace, or to the whole cluster
/// (`None`) when all namespaces are selected. Policy-labelled ConfigMaps may
/// bypass the namespace selection, in which case the classifier filters a
/// single cluster-wide watch instead.
fn configmap_namespaces(config: &ClassifierConfig) -> Vec<Option<String>> {
    let bypass = config.enable_policies
        && config.policy_label_bypasses_namespace
        && !config.require_policy_label;
    if bypass || config.selects_all_namespaces() {
        return vec![None];
    }
    let mut namespaces = config
        .namespaces
        .iter()
        .filter(|ns| !ns.is_empty())
        .cloned()
        .map(Some)
        .collect::<Vec<_>>();
    namespaces.sort();
    namespaces.dedup();
    namespaces
}

fn dynamic_api(client: k8s::Client, rt: &ResourceType) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(&rt.group, &rt.version, "");
    let resource = ApiResource::from_gvk_with_plural(&gvk, &rt.resource);
    match rt.namespace() {
        Some(ns) => Api::namespaced_with(client, ns, &resource),
        None => Api::all_with(client, &resource),
    }
}

// === impl Namespaced ===

impl std::str::FromStr for Namespaced {
    type Err = k8s::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::parse(s, true).map(Self)
    }
}

// === impl ClusterScoped ===

impl std::str::FromStr for ClusterScoped {
    type Err = k8s::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::parse(s, false).map(Self)
    }
}
