//! In-memory log sources for tests

use std::collections::HashMap;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::io::{AsyncBufRead, AsyncRead, BufReader, Cursor};
use futures::stream::IntoAsyncRead;
use futures::TryStreamExt;
use parking_lot::Mutex;

use kubelogs_k8s::{LabelSelector, LogSource, LogStream, SourceError};
use kubelogs_types::{PodInfo, StreamOptions};

/// Cloneable in-memory writer for capturing sink output
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose reader has gone away, like stdout piped into `head`
pub struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
    }
}

pub type ChunkSender = mpsc::UnboundedSender<io::Result<Vec<u8>>>;
pub type ChannelStream = IntoAsyncRead<mpsc::UnboundedReceiver<io::Result<Vec<u8>>>>;

pub fn cursor_stream(bytes: &[u8]) -> LogStream {
    Box::pin(Cursor::new(bytes.to_vec()))
}

/// Stream fed chunk by chunk from the returned sender; dropping it ends the stream
pub fn channel_stream() -> (ChunkSender, ChannelStream) {
    let (tx, rx) = mpsc::unbounded();
    (tx, rx.into_async_read())
}

/// Reader that yields `data`, then fails like a dropped connection
pub struct FailAfter {
    data: Cursor<Vec<u8>>,
}

impl AsyncRead for FailAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match Pin::new(&mut self.data).poll_read(cx, buf) {
            Poll::Ready(Ok(0)) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            other => other,
        }
    }
}

pub fn failing_stream(data: &[u8]) -> BufReader<FailAfter> {
    BufReader::new(FailAfter {
        data: Cursor::new(data.to_vec()),
    })
}

/// Counts how many times the wrapped stream is closed (dropped)
pub struct Tracked<R> {
    inner: R,
    closed: Arc<AtomicUsize>,
}

impl<R> Tracked<R>
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    pub fn boxed(inner: R, closed: Arc<AtomicUsize>) -> LogStream {
        Box::pin(Self { inner, closed })
    }
}

impl<R> Drop for Tracked<R> {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Tracked<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<R: AsyncBufRead + Unpin> AsyncBufRead for Tracked<R> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.inner).consume(amt)
    }
}

/// What a fake pod's log request produces
pub enum FakeLog {
    Bytes(Vec<u8>),
    FailAttach(String),
    FailRead(Vec<u8>),
    Channel(ChannelStream),
}

/// A [`LogSource`] backed by canned pods and streams
pub struct FakeSource {
    namespace: String,
    pods: Vec<PodInfo>,
    discovery_error: Option<String>,
    logs: Mutex<HashMap<String, FakeLog>>,
    pub list_calls: AtomicUsize,
    pub attach_calls: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub listed: Mutex<Vec<(String, String)>>,
    pub options_seen: Mutex<Vec<StreamOptions>>,
}

impl FakeSource {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            pods: Vec::new(),
            discovery_error: None,
            logs: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            attach_calls: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            listed: Mutex::new(Vec::new()),
            options_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pod(mut self, name: &str, log: FakeLog) -> Self {
        self.pods
            .push(PodInfo::new(name.to_string(), self.namespace.clone()));
        self.logs.lock().insert(name.to_string(), log);
        self
    }

    /// Add a pod whose stream is fed through the returned sender
    pub fn with_channel_pod(self, name: &str) -> (Self, ChunkSender) {
        let (tx, stream) = channel_stream();
        (self.with_pod(name, FakeLog::Channel(stream)), tx)
    }

    pub fn failing_discovery(mut self, message: &str) -> Self {
        self.discovery_error = Some(message.to_string());
        self
    }

    pub fn attach_count(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LogSource for FakeSource {
    fn default_namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodInfo>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listed
            .lock()
            .push((namespace.to_string(), selector.to_string()));

        if let Some(message) = &self.discovery_error {
            return Err(message.clone().into());
        }
        Ok(self.pods.clone())
    }

    async fn open_log_stream(
        &self,
        pod: &PodInfo,
        options: &StreamOptions,
    ) -> Result<LogStream, SourceError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        self.options_seen.lock().push(options.clone());

        let log = self
            .logs
            .lock()
            .remove(&pod.name)
            .ok_or_else(|| format!("pod {} opened twice", pod.name))?;

        let closed = Arc::clone(&self.closed);
        match log {
            FakeLog::Bytes(bytes) => Ok(Tracked::boxed(Cursor::new(bytes), closed)),
            FakeLog::FailAttach(message) => Err(message.into()),
            FakeLog::FailRead(bytes) => Ok(Tracked::boxed(failing_stream(&bytes), closed)),
            FakeLog::Channel(stream) => Ok(Tracked::boxed(stream, closed)),
        }
    }
}
