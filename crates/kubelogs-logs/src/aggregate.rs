use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kubelogs_k8s::{LabelSelector, LogSource, LogStream, SelectorError, SourceError};
use kubelogs_types::{PodInfo, StreamOptions};

use crate::color::ColorAllocator;
use crate::group::{ConsumerGroup, ConsumerReport};
use crate::sink::OutputSink;
use crate::stream::{ConsumerOutcome, LogConsumer, SourceLabel};

/// Errors that end an aggregate operation
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("invalid label selector {selector:?}: {source}")]
    InvalidSelector {
        selector: String,
        #[source]
        source: SelectorError,
    },

    #[error("failed to list pods in namespace {namespace}: {source}")]
    Discovery {
        namespace: String,
        #[source]
        source: SourceError,
    },

    #[error("no pods matching '{selector}' in namespace: {namespace}")]
    NoInstancesMatched { selector: String, namespace: String },

    #[error(
        "failed to attach to {} of {attempted} pods: {}",
        .failed.len(),
        .failed.join(", ")
    )]
    AttachFailed {
        failed: Vec<String>,
        attempted: usize,
        summary: AggregateSummary,
    },
}

/// One invocation's inputs
#[derive(Clone, Debug)]
pub struct AggregateRequest {
    /// Raw label query
    pub selector: String,

    /// Namespace to search; the source's default when `None`
    pub namespace: Option<String>,

    /// Options applied to every pod's stream
    pub options: StreamOptions,

    /// Color assignment for pod labels
    pub colors: ColorAllocator,
}

impl AggregateRequest {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            namespace: None,
            options: StreamOptions::default(),
            colors: ColorAllocator::default(),
        }
    }

    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn colors(mut self, colors: ColorAllocator) -> Self {
        self.colors = colors;
        self
    }
}

/// What happened to every pod of a finished operation
#[derive(Clone, Debug)]
pub struct AggregateSummary {
    pub namespace: String,
    /// Canonical form of the resolved selector
    pub selector: String,
    pub follow: bool,
    /// Snapshot: discovery order. Follow: completion order.
    pub reports: Vec<ConsumerReport>,
}

impl AggregateSummary {
    /// Pods whose consumer stopped on an error
    pub fn failures(&self) -> impl Iterator<Item = &ConsumerReport> {
        self.reports.iter().filter(|r| r.outcome.is_error())
    }

    pub fn was_cancelled(&self) -> bool {
        self.reports
            .iter()
            .any(|r| r.outcome == ConsumerOutcome::Cancelled)
    }
}

/// Discovers pods and relays their logs to a shared sink
pub struct LogAggregator<S> {
    source: Arc<S>,
    sink: OutputSink,
    cancel: CancellationToken,
}

impl<S: LogSource> LogAggregator<S> {
    pub fn new(source: S, sink: OutputSink) -> Self {
        Self::from_shared(Arc::new(source), sink)
    }

    pub fn from_shared(source: Arc<S>, sink: OutputSink) -> Self {
        Self {
            source,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop following (and any running copy) when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one aggregate operation.
    ///
    /// Selector and discovery failures end the operation before any stream is
    /// opened. A pod whose stream cannot be opened is reported and skipped
    /// while every other pod is still relayed; the run then returns
    /// [`AggregateError::AttachFailed`]. Read errors on an open stream only
    /// end that pod's consumer.
    pub async fn run(&self, request: AggregateRequest) -> Result<AggregateSummary, AggregateError> {
        let AggregateRequest {
            selector: raw_selector,
            namespace,
            options,
            colors,
        } = request;

        let selector =
            LabelSelector::parse(&raw_selector).map_err(|source| AggregateError::InvalidSelector {
                selector: raw_selector.clone(),
                source,
            })?;

        let namespace = namespace.unwrap_or_else(|| self.source.default_namespace().to_string());

        let pods = self
            .source
            .list_pods(&namespace, &selector)
            .await
            .map_err(|source| AggregateError::Discovery {
                namespace: namespace.clone(),
                source,
            })?;

        if pods.is_empty() {
            return Err(AggregateError::NoInstancesMatched {
                selector: selector.to_string(),
                namespace,
            });
        }

        info!(
            pods = pods.len(),
            namespace = %namespace,
            selector = %selector,
            follow = options.follow,
            "relaying pod logs"
        );

        let reports = if options.follow {
            self.follow_all(pods, &options, &colors).await
        } else {
            self.snapshot_all(&pods, &options, &colors).await
        };

        let summary = AggregateSummary {
            namespace,
            selector: selector.to_string(),
            follow: options.follow,
            reports,
        };

        let failed: Vec<String> = summary
            .reports
            .iter()
            .filter(|r| r.outcome.is_attach_failure())
            .map(|r| r.pod_name.clone())
            .collect();

        if failed.is_empty() {
            Ok(summary)
        } else {
            Err(AggregateError::AttachFailed {
                attempted: summary.reports.len(),
                failed,
                summary,
            })
        }
    }

    /// Copy each pod's logs in discovery order, one after another
    async fn snapshot_all(
        &self,
        pods: &[PodInfo],
        options: &StreamOptions,
        colors: &ColorAllocator,
    ) -> Vec<ConsumerReport> {
        let mut reports = Vec::with_capacity(pods.len());

        for (index, pod) in pods.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            let label = SourceLabel::new(&pod.name, colors.color_for(index));
            let outcome = match attach(&*self.source, pod, options, &self.sink, &self.cancel).await {
                Ok(stream) => {
                    LogConsumer::new(label, stream, self.sink.clone(), self.cancel.clone())
                        .snapshot()
                        .await
                }
                Err(outcome) => outcome,
            };
            let closed = matches!(outcome, ConsumerOutcome::SinkClosed { .. });
            reports.push(ConsumerReport::new(pod.name.clone(), outcome));
            if closed {
                debug!("output closed, skipping remaining pods");
                break;
            }
        }

        reports
    }

    /// Follow every pod concurrently until all streams end or the run is cancelled
    async fn follow_all(
        &self,
        pods: Vec<PodInfo>,
        options: &StreamOptions,
        colors: &ColorAllocator,
    ) -> Vec<ConsumerReport> {
        let mut group = ConsumerGroup::new(self.cancel.child_token());

        for (index, pod) in pods.into_iter().enumerate() {
            let label = SourceLabel::new(&pod.name, colors.color_for(index));
            let source = Arc::clone(&self.source);
            let sink = self.sink.clone();
            let cancel = group.cancellation_token();
            let options = options.clone();

            group.spawn(pod.name.clone(), async move {
                let outcome = match attach(&*source, &pod, &options, &sink, &cancel).await {
                    Ok(stream) => {
                        LogConsumer::new(label, stream, sink, cancel.clone())
                            .follow()
                            .await
                    }
                    Err(outcome) => outcome,
                };
                // A closed output ends every consumer
                if matches!(outcome, ConsumerOutcome::SinkClosed { .. }) {
                    cancel.cancel();
                }
                outcome
            });
        }

        debug!(consumers = group.registered(), "waiting for follow consumers");
        group.wait().await
    }
}

/// Open one pod's stream, reporting a failure on the diagnostic channel
async fn attach<S: LogSource>(
    source: &S,
    pod: &PodInfo,
    options: &StreamOptions,
    sink: &OutputSink,
    cancel: &CancellationToken,
) -> Result<LogStream, ConsumerOutcome> {
    let result = tokio::select! {
        _ = cancel.cancelled() => return Err(ConsumerOutcome::Cancelled),
        result = source.open_log_stream(pod, options) => result,
    };

    result.map_err(|e| {
        debug!(pod = %pod.name, error = %e, "failed to open log stream");
        sink.diagnostic(&format!("Error attaching to pod {}: {}", pod.name, e));
        ConsumerOutcome::AttachFailed {
            error: e.to_string(),
        }
    })
}
