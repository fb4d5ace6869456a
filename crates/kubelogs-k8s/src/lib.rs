//! Kubernetes integration for kubelogs
//!
//! This crate resolves label selectors, lists the pods they match, and opens
//! per-pod log streams. The [`LogSource`] trait is the seam the aggregation
//! engine talks to; [`KubeClient`] is its cluster-backed implementation.

mod client;
mod selector;
mod source;

pub use client::KubeClient;
pub use selector::{LabelSelector, Operator, Requirement, SelectorError};
pub use source::{LogSource, LogStream, SourceError};

// Re-export types that are used in our public API
pub use kubelogs_types::{ContainerInfo, PodInfo, PodStatus, StreamOptions};
