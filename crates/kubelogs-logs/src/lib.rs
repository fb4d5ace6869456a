//! Log stream aggregation for kubelogs
//!
//! This crate attaches to many pod log streams at once and relays them to a
//! single output: pod-attributed and colored lines when following, verbatim
//! copies under a header per pod for snapshots.

mod aggregate;
mod color;
mod group;
mod sink;
mod stream;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregateError, AggregateRequest, AggregateSummary, LogAggregator};
pub use color::{ColorAllocator, DEFAULT_PALETTE, NEUTRAL, paint, parse_color};
pub use group::{ConsumerGroup, ConsumerReport, LifecycleState};
pub use sink::OutputSink;
pub use stream::{ConsumerOutcome, LogConsumer, SourceLabel};

// Re-export types used in our public API
pub use crossterm::style::Color;
pub use kubelogs_types::StreamOptions;
