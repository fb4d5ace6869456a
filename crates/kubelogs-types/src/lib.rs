//! Shared types for kubelogs
//!
//! This crate contains data structures used across multiple kubelogs crates.

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Pod information
#[derive(Clone, Debug)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub containers: Vec<ContainerInfo>,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            status: PodStatus::Unknown,
            containers: Vec::new(),
            node_name: None,
            pod_ip: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContainerInfo {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ready: false,
            restart_count: 0,
        }
    }
}

// ============================================================================
// Log Stream Types
// ============================================================================

/// Options applied to every pod's log request in one invocation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Container to read from; the server picks the only container when unset
    pub container: Option<String>,

    /// Number of trailing lines to fetch (`None` = all available lines)
    pub tail_lines: Option<i64>,

    /// Keep the stream open and relay new lines as they are written
    pub follow: bool,

    /// Only return lines newer than this many seconds
    pub since_seconds: Option<i64>,

    /// Ask the server to prefix every line with its timestamp
    pub timestamps: bool,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(mut self, container: Option<String>) -> Self {
        self.container = container.filter(|c| !c.is_empty());
        self
    }

    /// Set the tail line count; negative values mean "all lines"
    pub fn tail(mut self, tail: i64) -> Self {
        self.tail_lines = (tail >= 0).then_some(tail);
        self
    }

    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn since_seconds(mut self, since_seconds: Option<i64>) -> Self {
        self.since_seconds = since_seconds;
        self
    }

    pub fn timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Tail line count actually sent to the server.
    ///
    /// A `since` window takes precedence over the tail count.
    pub fn effective_tail_lines(&self) -> Option<i64> {
        if self.since_seconds.is_some() {
            None
        } else {
            self.tail_lines
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_tail_means_all_lines() {
        assert_eq!(StreamOptions::new().tail(-1).tail_lines, None);
        assert_eq!(StreamOptions::new().tail(-20).tail_lines, None);
        assert_eq!(StreamOptions::new().tail(0).tail_lines, Some(0));
        assert_eq!(StreamOptions::new().tail(10).tail_lines, Some(10));
    }

    #[test]
    fn test_since_overrides_tail() {
        let opts = StreamOptions::new().tail(10);
        assert_eq!(opts.effective_tail_lines(), Some(10));

        let opts = opts.since_seconds(Some(300));
        assert_eq!(opts.effective_tail_lines(), None);
    }

    #[test]
    fn test_empty_container_is_unset() {
        let opts = StreamOptions::new().container(Some(String::new()));
        assert_eq!(opts.container, None);

        let opts = StreamOptions::new().container(Some("ingress".into()));
        assert_eq!(opts.container.as_deref(), Some("ingress"));
    }

    #[test]
    fn test_pod_status_from_phase() {
        assert_eq!(PodStatus::from("Running"), PodStatus::Running);
        assert_eq!(PodStatus::from("Evicted"), PodStatus::Unknown);
    }
}
