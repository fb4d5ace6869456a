use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stream::ConsumerOutcome;

/// Final result of one pod's consumer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerReport {
    pub pod_name: String,
    pub outcome: ConsumerOutcome,
}

impl ConsumerReport {
    pub fn new(pod_name: impl Into<String>, outcome: ConsumerOutcome) -> Self {
        Self {
            pod_name: pod_name.into(),
            outcome,
        }
    }
}

/// Where a group is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing registered yet
    Start,
    /// At least one consumer still running
    Running,
    /// Every registered consumer has exited
    Terminal,
}

/// Deregisters a consumer when dropped, including on panic or abort
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn register(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tracks the concurrent consumers of one aggregate operation
pub struct ConsumerGroup {
    /// Cancellation token handed to every consumer
    cancel: CancellationToken,

    /// Running consumer tasks
    tasks: JoinSet<ConsumerReport>,

    /// Consumers ever spawned
    registered: usize,

    /// Consumers not yet finished
    active: Arc<AtomicUsize>,
}

impl ConsumerGroup {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: JoinSet::new(),
            registered: 0,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Token consumers should watch to stop early
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a consumer for `pod_name`; it counts as active until it returns
    pub fn spawn<F>(&mut self, pod_name: impl Into<String>, consumer: F)
    where
        F: Future<Output = ConsumerOutcome> + Send + 'static,
    {
        let pod_name = pod_name.into();
        let guard = ActiveGuard::register(&self.active);
        self.registered += 1;
        debug!(pod = %pod_name, active = self.active_count(), "consumer registered");

        self.tasks.spawn(async move {
            let _guard = guard;
            let outcome = match AssertUnwindSafe(consumer).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => ConsumerOutcome::Panicked {
                    error: panic_message(&*panic),
                },
            };
            ConsumerReport { pod_name, outcome }
        });
    }

    /// Number of consumers ever spawned
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Number of consumers still running
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.active_count() > 0
    }

    pub fn state(&self) -> LifecycleState {
        if self.registered == 0 {
            LifecycleState::Start
        } else if self.is_running() {
            LifecycleState::Running
        } else {
            LifecycleState::Terminal
        }
    }

    /// Wait for every consumer to exit, in completion order
    pub async fn wait(&mut self) -> Vec<ConsumerReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(report) => {
                    debug!(
                        pod = %report.pod_name,
                        outcome = ?report.outcome,
                        active = self.active_count(),
                        "consumer deregistered"
                    );
                    reports.push(report);
                }
                Err(e) => warn!(error = %e, "consumer task aborted"),
            }
        }
        reports
    }

    /// Cancel every consumer and abort their tasks
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.tasks.abort_all();
    }
}

impl Drop for ConsumerGroup {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "consumer panicked".to_string()
    }
}
