//! Buffered stream over a byte source with a background refill thread.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::error::StreamError;
use crate::ring::RingBuffer;
use crate::semaphore::Semaphore;
use crate::source::ByteSource;

/// Options for configuring a [`BufferedStream`].
///
/// All five sizes are required; the two behavior flags default to off and
/// are enabled through the builder toggles.
///
/// # Example
///
/// ```
/// use bytepump_stream::StreamOptions;
///
/// let opts = StreamOptions::new(64 * 1024, 32 * 1024, 8 * 1024, 16 * 1024, 4 * 1024)
///     .with_end_with_source();
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Total byte capacity of the ring buffer.
    pub capacity: usize,
    /// Occupancy at or below which a drain wakes the refill thread.
    pub read_threshold: usize,
    /// Bytes requested from the source per refill read.
    pub read_size: usize,
    /// Minimum occupancy for the stream to report ready. A zero threshold
    /// means the stream is always ready and disables blocking reads.
    pub ready_threshold: usize,
    /// Maximum occupancy for the stream to report not ready.
    pub not_ready_threshold: usize,
    /// Block reads on the ready signal while the buffer is empty.
    pub wait_for_ready: bool,
    /// End the stream as soon as the source reads 0 bytes.
    pub end_with_source: bool,
}

impl StreamOptions {
    /// Creates options with the given sizes and both behavior flags off.
    pub fn new(
        capacity: usize,
        read_threshold: usize,
        read_size: usize,
        ready_threshold: usize,
        not_ready_threshold: usize,
    ) -> Self {
        Self {
            capacity,
            read_threshold,
            read_size,
            ready_threshold,
            not_ready_threshold,
            wait_for_ready: false,
            end_with_source: false,
        }
    }

    /// Makes `read` block on the ready signal while the buffer is empty.
    ///
    /// Without `end_with_source`, a source that stalls forever leaves such
    /// reads blocked until `close` is called; that trade-off belongs to the
    /// caller.
    pub fn with_wait_for_ready(mut self) -> Self {
        self.wait_for_ready = true;
        self
    }

    /// Ends the stream once the source returns a 0-byte read, instead of
    /// retrying the source.
    pub fn with_end_with_source(mut self) -> Self {
        self.end_with_source = true;
        self
    }

    /// Checks the configuration for inconsistencies.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "capacity must be greater than 0".into(),
            ));
        }
        if self.read_size == 0 {
            return Err(StreamError::InvalidConfig(
                "read_size must be greater than 0".into(),
            ));
        }
        if self.ready_threshold > self.capacity {
            return Err(StreamError::InvalidConfig(format!(
                "ready_threshold {} exceeds capacity {}",
                self.ready_threshold, self.capacity
            )));
        }
        if self.not_ready_threshold > self.ready_threshold {
            return Err(StreamError::InvalidConfig(format!(
                "not_ready_threshold {} exceeds ready_threshold {}",
                self.not_ready_threshold, self.ready_threshold
            )));
        }
        if self.read_threshold >= self.capacity {
            return Err(StreamError::InvalidConfig(format!(
                "read_threshold {} must be below capacity {}",
                self.read_threshold, self.capacity
            )));
        }
        Ok(())
    }
}

/// A flow-controlled buffered stream over a [`ByteSource`].
///
/// Between `open` and `close`, a background refill thread keeps a fixed
/// ring buffer topped off from the source. Foreground callers drain the
/// buffer through `read`/`skip` and can pace themselves on the
/// `is_ready`/`is_not_ready` thresholds instead of polling the source.
///
/// The stream is `Clone`; clones share the same buffer and session via
/// `Arc`. Any number of threads may read concurrently, though fairness
/// between them is not guaranteed.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use std::sync::Arc;
/// use bytepump_stream::{BufferedStream, ReaderSource, StreamOptions};
///
/// let opts = StreamOptions::new(64, 32, 16, 24, 8)
///     .with_wait_for_ready()
///     .with_end_with_source();
/// let stream = BufferedStream::new(opts).unwrap();
///
/// let data = b"the quick brown fox jumps over the lazy dog".to_vec();
/// let source = ReaderSource::with_size(Cursor::new(data.clone()), data.len());
/// stream.open(Arc::new(source)).unwrap();
///
/// let mut out = Vec::new();
/// let mut chunk = [0u8; 10];
/// loop {
///     match stream.read(&mut chunk) {
///         0 => break,
///         n => out.extend_from_slice(&chunk[..n]),
///     }
/// }
/// stream.close();
/// assert_eq!(out, data);
/// assert_eq!(stream.position(), data.len());
/// ```
pub struct BufferedStream {
    inner: Arc<Inner>,
}

impl Clone for BufferedStream {
    fn clone(&self) -> Self {
        BufferedStream {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner {
    opts: StreamOptions,
    ring: Mutex<RingState>,
    /// Occupancy mirror for lock-free status queries. Only written while
    /// `ring` is held.
    available: AtomicUsize,
    /// Wakes the refill thread when a drain crosses `read_threshold`.
    fill_sem: Semaphore,
    /// Wakes blocked readers when occupancy crosses `ready_threshold`.
    ready_sem: Semaphore,
    running: AtomicBool,
    terminating: AtomicBool,
    /// The source has ended (end-of-data or error); remaining buffered
    /// bytes stay readable.
    ended: AtomicBool,
    source: Mutex<Option<Arc<dyn ByteSource>>>,
    error: Mutex<Option<Arc<io::Error>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct RingState {
    ring: RingBuffer,
    read_total: usize,
}

impl BufferedStream {
    /// Creates a closed stream with the given options.
    ///
    /// Fails fast on an inconsistent configuration instead of producing
    /// silently incorrect readiness flags later.
    pub fn new(opts: StreamOptions) -> Result<Self, StreamError> {
        opts.validate()?;
        let fill_sem = Semaphore::new(0);
        let ready_sem = Semaphore::new(0);
        // A stream starts out closed; open() re-arms both signals.
        fill_sem.close();
        ready_sem.close();

        Ok(BufferedStream {
            inner: Arc::new(Inner {
                ring: Mutex::new(RingState {
                    ring: RingBuffer::new(opts.capacity),
                    read_total: 0,
                }),
                available: AtomicUsize::new(0),
                fill_sem,
                ready_sem,
                running: AtomicBool::new(false),
                terminating: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                source: Mutex::new(None),
                error: Mutex::new(None),
                task: Mutex::new(None),
                opts,
            }),
        })
    }

    /// Starts a session: resets the buffer, stores the source and spawns
    /// the refill thread.
    ///
    /// Returns [`StreamError::AlreadyOpen`] without touching the running
    /// session if one exists.
    pub fn open(&self, source: Arc<dyn ByteSource>) -> Result<(), StreamError> {
        let inner = &self.inner;
        let mut task = inner.task.lock().unwrap();
        if inner.running.load(Ordering::SeqCst) {
            return Err(StreamError::AlreadyOpen);
        }

        {
            let mut state = inner.ring.lock().unwrap();
            state.ring.reset();
            state.read_total = 0;
        }
        inner.available.store(0, Ordering::SeqCst);
        inner.terminating.store(false, Ordering::SeqCst);
        inner.ended.store(false, Ordering::SeqCst);
        *inner.error.lock().unwrap() = None;
        // One fill opportunity is granted up front so the thread starts
        // filling without waiting for a drain.
        inner.fill_sem.reset(1);
        inner.ready_sem.reset(0);
        *inner.source.lock().unwrap() = Some(Arc::clone(&source));

        inner.running.store(true, Ordering::SeqCst);
        let task_inner = Arc::clone(inner);
        *task = Some(thread::spawn(move || task_inner.refill_loop(source)));
        debug!("stream opened (capacity {})", inner.opts.capacity);
        Ok(())
    }

    /// Ends the session: unblocks every waiter, stops and joins the refill
    /// thread, then releases the source. Idempotent, callable from any
    /// thread.
    ///
    /// A reader blocked on the ready signal when `close` is called wakes up
    /// and reads 0 bytes.
    pub fn close(&self) {
        let inner = &self.inner;
        let handle = {
            let mut task = inner.task.lock().unwrap();
            if !inner.running.load(Ordering::SeqCst) {
                return;
            }
            inner.terminating.store(true, Ordering::SeqCst);
            inner.fill_sem.close();
            inner.ready_sem.close();
            task.take()
        };
        // The refill thread must be fully stopped before the source goes
        // away.
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("refill thread panicked");
            }
        }
        *inner.source.lock().unwrap() = None;
        inner.running.store(false, Ordering::SeqCst);
        debug!("stream closed after {} bytes read", self.position());
    }

    /// Reads up to `dst.len()` buffered bytes into `dst`.
    ///
    /// With `wait_for_ready`, blocks on the ready signal while the buffer
    /// is empty and the stream has neither ended nor closed. Returns 0 once
    /// no bytes remain and the stream has ended, or when it is not running.
    pub fn read(&self, dst: &mut [u8]) -> usize {
        self.consume(dst.len(), Some(dst))
    }

    /// Discards up to `len` buffered bytes.
    ///
    /// Equivalent to `read` without copying out: the skipped bytes count
    /// toward `position()` and trigger the same refill signaling.
    pub fn skip(&self, len: usize) -> usize {
        self.consume(len, None)
    }

    /// Total bytes delivered by `read` and `skip` this session.
    pub fn position(&self) -> usize {
        self.inner.ring.lock().unwrap().read_total
    }

    /// Declared total size of the source, if one is open and knows it.
    pub fn size(&self) -> Option<usize> {
        let source = self.inner.source.lock().unwrap();
        source.as_ref().and_then(|s| s.size())
    }

    /// Bytes currently buffered and available to read.
    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Whether a safe amount of data (`ready_threshold`) is buffered.
    pub fn is_ready(&self) -> bool {
        self.available() >= self.inner.opts.ready_threshold
    }

    /// Whether buffered data has dropped to an unsafe level
    /// (`not_ready_threshold`) and the caller should slow down.
    pub fn is_not_ready(&self) -> bool {
        self.available() <= self.inner.opts.not_ready_threshold
    }

    /// Blocks until occupancy crosses the ready threshold.
    ///
    /// Returns false when the stream ends or closes before becoming ready.
    pub fn wait_ready(&self) -> bool {
        self.inner.ready_sem.acquire()
    }

    /// Whether a session is currently open.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The source error that ended the session, if any.
    pub fn error(&self) -> Option<Arc<io::Error>> {
        self.inner.error.lock().unwrap().clone()
    }

    fn consume(&self, len: usize, mut dst: Option<&mut [u8]>) -> usize {
        let inner = &self.inner;
        if len == 0
            || !inner.running.load(Ordering::SeqCst)
            || inner.terminating.load(Ordering::SeqCst)
        {
            return 0;
        }
        loop {
            if inner.opts.wait_for_ready
                && inner.opts.ready_threshold > 0
                && inner.available.load(Ordering::SeqCst) == 0
                && !inner.ended.load(Ordering::SeqCst)
                && !inner.terminating.load(Ordering::SeqCst)
            {
                // Wakes on the ready crossing, source end, or close.
                inner.ready_sem.acquire();
            }
            if inner.terminating.load(Ordering::SeqCst) {
                return 0;
            }

            let (before, after, n) = {
                let mut state = inner.ring.lock().unwrap();
                let before = state.ring.len();
                let n = match dst.as_deref_mut() {
                    Some(buf) => state.ring.drain(buf),
                    None => state.ring.discard(len),
                };
                state.read_total += n;
                let after = state.ring.len();
                inner.available.store(after, Ordering::SeqCst);
                (before, after, n)
            };

            if n > 0 {
                if before > inner.opts.read_threshold
                    && after <= inner.opts.read_threshold
                    && !inner.ended.load(Ordering::SeqCst)
                {
                    // There is now room worth refilling.
                    inner.fill_sem.release();
                }
                return n;
            }
            if !inner.opts.wait_for_ready
                || inner.opts.ready_threshold == 0
                || inner.ended.load(Ordering::SeqCst)
                || inner.terminating.load(Ordering::SeqCst)
            {
                return 0;
            }
            // Woken by a ready permit that predates this drain; wait for
            // the next crossing.
        }
    }
}

impl Inner {
    fn refill_loop(&self, source: Arc<dyn ByteSource>) {
        // One scratch chunk for the thread's lifetime; the hot path never
        // allocates.
        let mut chunk = vec![0u8; self.opts.read_size];
        trace!("refill thread started");
        while self.fill_sem.acquire() {
            if self.terminating.load(Ordering::SeqCst) {
                break;
            }
            self.fill(&*source, &mut chunk);
            if self.ended.load(Ordering::SeqCst) {
                break;
            }
        }
        trace!("refill thread exiting");
    }

    /// One fill cycle: tops the buffer off until it is full, the source
    /// ends, or the stream is shutting down.
    fn fill(&self, source: &dyn ByteSource, chunk: &mut [u8]) {
        loop {
            if self.terminating.load(Ordering::SeqCst) {
                return;
            }
            // Readers only grow the free space between this load and the
            // write below, so the request can never overfill the ring.
            let free = self.opts.capacity - self.available.load(Ordering::SeqCst);
            let want = self.opts.read_size.min(free);
            if want == 0 {
                // Full; sleep until a drain crosses the read threshold.
                // Accumulated fill permits land here too.
                return;
            }
            match source.read(&mut chunk[..want]) {
                Ok(0) if self.opts.end_with_source => {
                    debug!(
                        "source ended, {} bytes still buffered",
                        self.available.load(Ordering::SeqCst)
                    );
                    self.finish(None);
                    return;
                }
                // The source has nothing right now but may later (e.g. a
                // stream still connecting); retry at once.
                Ok(0) => continue,
                Ok(n) => self.commit(&chunk[..n]),
                Err(e) => {
                    warn!("source read failed: {e}");
                    self.finish(Some(e));
                    return;
                }
            }
        }
    }

    /// Copies freshly read bytes into the ring and signals readiness on the
    /// upward threshold crossing.
    fn commit(&self, data: &[u8]) {
        let (before, after) = {
            let mut state = self.ring.lock().unwrap();
            let before = state.ring.len();
            let n = state.ring.write(data);
            debug_assert_eq!(n, data.len());
            let after = state.ring.len();
            self.available.store(after, Ordering::SeqCst);
            (before, after)
        };
        if before < self.opts.ready_threshold && after >= self.opts.ready_threshold {
            self.ready_sem.release();
        }
    }

    /// Marks the source ended and releases everything blocked on
    /// readiness; buffered bytes remain readable.
    fn finish(&self, err: Option<io::Error>) {
        if let Some(e) = err {
            *self.error.lock().unwrap() = Some(Arc::new(e));
        }
        self.ended.store(true, Ordering::SeqCst);
        self.ready_sem.close();
    }
}

/// Blocking [`io::Read`] adapter.
///
/// Pair `with_wait_for_ready` with `with_end_with_source` when using the
/// stream through this impl, so that `Ok(0)` means end-of-stream the way
/// `io::Read` consumers expect.
impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(BufferedStream::read(self, buf))
    }
}

impl Read for &BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(BufferedStream::read(*self, buf))
    }
}
