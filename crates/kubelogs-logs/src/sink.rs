use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Thread-safe output shared by every pod consumer.
///
/// Log lines go to `out`, diagnostics to `err`. Each line is assembled first
/// and written under the lock in one call, so lines from different pods never
/// interleave mid-line.
///
/// Writes are blocking and happen on the calling task's worker thread; a
/// stalled terminal stalls every consumer waiting on the lock.
#[derive(Clone)]
pub struct OutputSink {
    out: SharedWriter,
    err: SharedWriter,
}

impl OutputSink {
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            err: Arc::new(Mutex::new(Box::new(err))),
        }
    }

    /// Process stdout and stderr
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Write `<prefix> <payload>\n` as a single unit
    pub fn write_line(&self, prefix: &str, payload: &[u8]) -> io::Result<()> {
        let mut line = Vec::with_capacity(prefix.len() + payload.len() + 2);
        line.extend_from_slice(prefix.as_bytes());
        line.push(b' ');
        line.extend_from_slice(payload);
        line.push(b'\n');

        let mut out = self.out.lock();
        out.write_all(&line)?;
        out.flush()
    }

    /// Write a header line on its own
    pub fn write_header(&self, header: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(header.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }

    /// Write raw bytes with no framing
    pub fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(bytes)?;
        out.flush()
    }

    /// Report a problem on the diagnostic channel
    pub fn diagnostic(&self, message: &str) {
        let mut err = self.err.lock();
        // Nowhere left to report a failing stderr
        let _ = writeln!(err, "{}", message);
        let _ = err.flush();
    }
}
