use crossterm::style::Color;
use futures::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use kubelogs_k8s::LogStream;

use crate::color::paint;
use crate::sink::OutputSink;

/// Initial capacity of a consumer's line buffer
const LINE_CAPACITY: usize = 512;

/// Identity of one pod in the output
#[derive(Clone, Debug)]
pub struct SourceLabel {
    pub pod_name: String,
    pub color: Color,
}

impl SourceLabel {
    pub fn new(pod_name: impl Into<String>, color: Color) -> Self {
        Self {
            pod_name: pod_name.into(),
            color,
        }
    }

    /// Prefix written before every followed line
    pub fn line_prefix(&self) -> String {
        paint(&format!("POD {}:", self.pod_name), self.color)
    }

    /// Header written before a snapshot copy
    pub fn header(&self) -> String {
        paint(&format!("Logs for pod {}:", self.pod_name), self.color)
    }
}

/// How a single pod's consumer finished
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumerOutcome {
    /// Follow stream reached its end
    Ended { lines: u64 },
    /// Snapshot copied completely
    Copied { bytes: u64 },
    /// Stopped through the cancellation token
    Cancelled,
    /// Opening the stream failed
    AttachFailed { error: String },
    /// Reading from an open stream failed
    ReadFailed { error: String },
    /// The output could not be written
    SinkClosed { error: String },
    /// The consumer task panicked
    Panicked { error: String },
}

impl ConsumerOutcome {
    pub fn is_attach_failure(&self) -> bool {
        matches!(self, Self::AttachFailed { .. })
    }

    /// Whether the consumer stopped because something went wrong
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::AttachFailed { .. }
                | Self::ReadFailed { .. }
                | Self::SinkClosed { .. }
                | Self::Panicked { .. }
        )
    }
}

/// Relays one pod's log stream to the shared output.
///
/// The consumer owns the stream; it is dropped, and the connection closed,
/// when `follow` or `snapshot` returns, whatever the exit path.
pub struct LogConsumer {
    label: SourceLabel,
    stream: LogStream,
    sink: OutputSink,
    cancel: CancellationToken,
}

impl LogConsumer {
    pub fn new(
        label: SourceLabel,
        stream: LogStream,
        sink: OutputSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label,
            stream,
            sink,
            cancel,
        }
    }

    /// Relay the stream line by line, each line prefixed with the pod name
    pub async fn follow(mut self) -> ConsumerOutcome {
        let prefix = self.label.line_prefix();
        let mut buf = Vec::with_capacity(LINE_CAPACITY);
        let mut lines = 0u64;

        let outcome = loop {
            buf.clear();

            let read = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.stream.read_until(b'\n', &mut buf) => Some(result),
            };

            match read {
                None => break ConsumerOutcome::Cancelled,
                Some(Ok(0)) => break ConsumerOutcome::Ended { lines },
                Some(Ok(_)) => {
                    if let Err(e) = self.sink.write_line(&prefix, trim_line_ending(&buf)) {
                        break ConsumerOutcome::SinkClosed {
                            error: e.to_string(),
                        };
                    }
                    lines += 1;
                }
                Some(Err(e)) => {
                    debug!(pod = %self.label.pod_name, error = %e, "log stream read failed");
                    self.sink.diagnostic(&format!(
                        "Error from stream for pod {}: {}",
                        self.label.pod_name, e
                    ));
                    break ConsumerOutcome::ReadFailed {
                        error: e.to_string(),
                    };
                }
            }
        };

        debug!(pod = %self.label.pod_name, ?outcome, "follow consumer finished");
        outcome
    }

    /// Write a header, then copy the stream's bytes verbatim
    pub async fn snapshot(mut self) -> ConsumerOutcome {
        if let Err(e) = self.sink.write_header(&self.label.header()) {
            return ConsumerOutcome::SinkClosed {
                error: e.to_string(),
            };
        }

        let mut bytes = 0u64;
        let mut last = b'\n';

        let mut outcome = loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.stream.fill_buf() => Some(result.map(<[u8]>::to_vec)),
            };

            match read {
                None => break ConsumerOutcome::Cancelled,
                Some(Ok(chunk)) if chunk.is_empty() => break ConsumerOutcome::Copied { bytes },
                Some(Ok(chunk)) => {
                    self.stream.consume_unpin(chunk.len());
                    if let Err(e) = self.sink.write_raw(&chunk) {
                        break ConsumerOutcome::SinkClosed {
                            error: e.to_string(),
                        };
                    }
                    bytes += chunk.len() as u64;
                    if let Some(&b) = chunk.last() {
                        last = b;
                    }
                }
                Some(Err(e)) => {
                    debug!(pod = %self.label.pod_name, error = %e, "log snapshot read failed");
                    self.sink.diagnostic(&format!(
                        "Error copying logs for pod {}: {}",
                        self.label.pod_name, e
                    ));
                    break ConsumerOutcome::ReadFailed {
                        error: e.to_string(),
                    };
                }
            }
        };

        // Keep the next header on its own line
        if last != b'\n' && !matches!(outcome, ConsumerOutcome::SinkClosed { .. }) {
            if let Err(e) = self.sink.write_raw(b"\n") {
                outcome = ConsumerOutcome::SinkClosed {
                    error: e.to_string(),
                };
            }
        }

        debug!(pod = %self.label.pod_name, ?outcome, "snapshot copy finished");
        outcome
    }
}

/// Strip a trailing `\n` or `\r\n`
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
