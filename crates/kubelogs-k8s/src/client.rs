//! Kubernetes client for kubelogs

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::selector::LabelSelector;
use crate::source::{LogSource, LogStream, SourceError};
use kubelogs_types::{ContainerInfo, PodInfo, PodStatus, StreamOptions};

/// Kubernetes client wrapper
pub struct KubeClient {
    client: kube::Client,
    default_namespace: String,
}

impl KubeClient {
    /// Create a client for the given kubeconfig context.
    ///
    /// Without a context the configuration is inferred: the current
    /// kubeconfig context, or in-cluster credentials when running in a pod.
    pub async fn new(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(name) => Self::config_for_context(name).await?,
            None => kube::Config::infer()
                .await
                .context("Failed to load Kubernetes config. Is kubectl configured?")?,
        };

        let default_namespace = config.default_namespace.clone();
        let client = kube::Client::try_from(config).context(format!(
            "Failed to create client for context: {}",
            context.unwrap_or("(inferred)")
        ))?;

        debug!(
            context = context.unwrap_or("(inferred)"),
            namespace = %default_namespace,
            "connected to cluster"
        );

        Ok(Self {
            client,
            default_namespace,
        })
    }

    async fn config_for_context(context_name: &str) -> Result<kube::Config> {
        let kubeconfig =
            Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?;

        if !kubeconfig.contexts.iter().any(|c| c.name == context_name) {
            anyhow::bail!("Context '{}' not found in kubeconfig", context_name);
        }

        kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            },
        )
        .await
        .context(format!(
            "Failed to create config for context: {}",
            context_name
        ))
    }

    /// Convert a k8s Pod to PodInfo
    fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
        let name = pod.metadata.name.unwrap_or_default();
        let mut info = PodInfo::new(name, namespace.to_string());

        if let Some(spec) = &pod.spec {
            info.node_name = spec.node_name.clone();
            info.containers = spec
                .containers
                .iter()
                .map(|c| ContainerInfo::new(c.name.clone()))
                .collect();
        }

        if let Some(status) = pod.status {
            info.pod_ip = status.pod_ip;
            info.status = status
                .phase
                .as_deref()
                .map(PodStatus::from)
                .unwrap_or(PodStatus::Unknown);

            // Fill readiness from container statuses
            for cs in status.container_statuses.unwrap_or_default() {
                if let Some(container) = info.containers.iter_mut().find(|c| c.name == cs.name) {
                    container.ready = cs.ready;
                    container.restart_count = cs.restart_count;
                }
            }
        }

        info
    }

    fn log_params(options: &StreamOptions) -> LogParams {
        LogParams {
            follow: options.follow,
            container: options.container.clone(),
            tail_lines: options.effective_tail_lines(),
            since_seconds: options.since_seconds,
            timestamps: options.timestamps,
            ..Default::default()
        }
    }
}

impl LogSource for KubeClient {
    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodInfo>, SourceError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&selector.to_string()))
            .await?;

        debug!(namespace, selector = %selector, count = list.items.len(), "listed pods");

        Ok(list
            .items
            .into_iter()
            .map(|pod| Self::pod_to_info(pod, namespace))
            .collect())
    }

    async fn open_log_stream(
        &self,
        pod: &PodInfo,
        options: &StreamOptions,
    ) -> Result<LogStream, SourceError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = Self::log_params(options);
        let stream = pods.log_stream(&pod.name, &params).await?;

        debug!(pod = %pod.name, follow = options.follow, "opened log stream");

        Ok(Box::pin(stream))
    }
}
