//! The seam between the aggregation engine and the cluster

use std::future::Future;
use std::pin::Pin;

use futures::io::AsyncBufRead;

use crate::selector::LabelSelector;
use kubelogs_types::{PodInfo, StreamOptions};

/// Error returned by a [`LogSource`] call
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// An open, exclusively owned log stream for one pod.
///
/// Dropping the stream closes the underlying connection.
pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// Lists pods and opens their log streams
pub trait LogSource: Send + Sync + 'static {
    /// Namespace used when the caller does not name one
    fn default_namespace(&self) -> &str;

    /// List the pods in `namespace` matching `selector`, in server order
    fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> impl Future<Output = Result<Vec<PodInfo>, SourceError>> + Send;

    /// Open the log stream of a single pod
    fn open_log_stream(
        &self,
        pod: &PodInfo,
        options: &StreamOptions,
    ) -> impl Future<Output = Result<LogStream, SourceError>> + Send;
}
