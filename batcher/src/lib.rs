/*!
Buffering and scheduled batching of telemetry items.

A [`Batcher`] accepts items from any thread, enriches them with scope and SDK metadata, encodes them, and accumulates them in a [`Buffer`]. The buffered items are handed to a callback as a single `{"items":[...]}` document when any of these happen first:

- the number of buffered items reaches [`BatcherBuilder::max_item_count`],
- the buffered bytes reach [`BatcherBuilder::max_buffer_size_bytes`],
- [`BatcherBuilder::flush_timeout`] elapses after the first item was buffered,
- [`Batcher::flush`] is called.

The callback is expected to hand the batch off to a transport without blocking on it.

# Durable buffering

[`BatcherBuilder::durable`] swaps the growable buffer for a fixed-capacity [`DurableBuffer`]. The batcher owns that buffer behind the same lock its producers take and doesn't expose it, so its contents can't be read without that lock. A component that needs to inspect buffered items without locking, such as a crash handler, should own a [`DurableBuffer`] itself and write to it from a single context.

# Usage

```
use satchel_batcher::Batcher;
use satchel_core::{Metric, MetricValue, ScopeSnapshot, Timestamp};

let batcher = Batcher::<Metric>::builder(|batch: Vec<u8>, count: usize| {
    // Send `batch` containing `count` items somewhere
    # let _ = (batch, count);
})
.spawn()?;

batcher.add_item(
    Metric::new(Timestamp::UNIX_EPOCH, "requests", MetricValue::Counter(1)),
    &ScopeSnapshot::default(),
)?;

batcher.flush();
# Ok::<(), satchel_batcher::Error>(())
```
*/

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::{Duration, Instant},
};

use satchel_core::{
    encode::{self, EncodeError},
    enrich, BatchMetadata, Item, ScopeSnapshot,
};

use crate::internal_metrics::InternalMetrics;

pub mod buffer;
pub mod durable;
pub mod queue;

#[cfg(feature = "tokio")]
pub mod tokio;

mod internal_metrics;

pub use self::{
    buffer::{BatchBuffer, Buffer, EMPTY_BATCH},
    durable::DurableBuffer,
    queue::{DispatchQueue, Job, Scheduled, ThreadQueue},
};

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ITEM_COUNT: usize = 100;
pub const DEFAULT_MAX_BUFFER_SIZE_BYTES: usize = 1024 * 1024;

type OnBatch = Box<dyn Fn(Vec<u8>, usize) + Send + Sync>;
type BeforeSend<I> = Box<dyn Fn(I) -> Option<I> + Send + Sync>;

/**
A builder for a [`Batcher`].
*/
#[must_use = "call `.spawn()` to complete the builder"]
pub struct BatcherBuilder<I> {
    flush_timeout: Duration,
    max_item_count: usize,
    max_buffer_size_bytes: usize,
    enabled: bool,
    metadata: BatchMetadata,
    before_send: Option<BeforeSend<I>>,
    queue: Option<Arc<dyn DispatchQueue + Send + Sync>>,
    durable: Option<(usize, usize)>,
    on_batch: OnBatch,
}

impl<I: Item + 'static> BatcherBuilder<I> {
    /**
    Create a builder that delivers batches to `on_batch`.

    The callback receives the batch document and the number of items in it.
    */
    pub fn new(on_batch: impl Fn(Vec<u8>, usize) + Send + Sync + 'static) -> Self {
        BatcherBuilder {
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            max_item_count: DEFAULT_MAX_ITEM_COUNT,
            max_buffer_size_bytes: DEFAULT_MAX_BUFFER_SIZE_BYTES,
            enabled: true,
            metadata: BatchMetadata::default(),
            before_send: None,
            queue: None,
            durable: None,
            on_batch: Box::new(on_batch),
        }
    }

    /**
    How long to wait after the first item is buffered before flushing.
    */
    pub fn flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /**
    The number of buffered items that triggers an immediate flush.
    */
    pub fn max_item_count(mut self, max_item_count: usize) -> Self {
        self.max_item_count = max_item_count;
        self
    }

    /**
    The number of buffered bytes that triggers an immediate flush.
    */
    pub fn max_buffer_size_bytes(mut self, max_buffer_size_bytes: usize) -> Self {
        self.max_buffer_size_bytes = max_buffer_size_bytes;
        self
    }

    /**
    Whether items are captured at all.

    A disabled batcher discards every item it's given.
    */
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /**
    The SDK, environment, release, and installation values injected into every item.
    */
    pub fn metadata(mut self, metadata: BatchMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /**
    A hook that runs on every enriched item before it's buffered.

    The hook may modify the item, or return `None` to discard it.
    */
    pub fn before_send(
        mut self,
        before_send: impl Fn(I) -> Option<I> + Send + Sync + 'static,
    ) -> Self {
        self.before_send = Some(Box::new(before_send));
        self
    }

    /**
    The queue to schedule timed flushes on.

    If no queue is given then a [`ThreadQueue`] will be spawned.
    */
    pub fn queue(mut self, queue: impl DispatchQueue + Send + Sync + 'static) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    /**
    Buffer items in a [`DurableBuffer`] with the given fixed capacities instead of a growable in-memory buffer.

    The buffer is only reachable through the batcher's lock. See the crate docs on durable buffering.
    */
    pub fn durable(mut self, data_capacity: usize, items_capacity: usize) -> Self {
        self.durable = Some((data_capacity, items_capacity));
        self
    }

    /**
    Complete the builder, spawning a background queue if one wasn't provided.
    */
    pub fn spawn(self) -> Result<Batcher<I>, Error> {
        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(ThreadQueue::spawn().map_err(Error::spawn)?),
        };

        let buffer: Box<dyn Buffer + Send> = match self.durable {
            Some((data_capacity, items_capacity)) => {
                Box::new(DurableBuffer::new(data_capacity, items_capacity))
            }
            None => Box::new(BatchBuffer::new()),
        };

        Ok(Batcher {
            shared: Arc::new(Shared {
                flush_timeout: self.flush_timeout,
                max_item_count: self.max_item_count,
                max_buffer_size_bytes: self.max_buffer_size_bytes,
                enabled: self.enabled,
                metadata: self.metadata,
                before_send: self.before_send,
                on_batch: self.on_batch,
                queue,
                metrics: InternalMetrics::default(),
                state: Mutex::new(State {
                    buffer,
                    timer: None,
                    epoch: 0,
                }),
            }),
        })
    }
}

/**
A handle to a batch of items being accumulated.

Cloning a `Batcher` produces another handle to the same buffer. When the last handle is dropped any buffered items are flushed.
*/
pub struct Batcher<I> {
    shared: Arc<Shared<I>>,
}

impl<I> Clone for Batcher<I> {
    fn clone(&self) -> Self {
        Batcher {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<I> {
    flush_timeout: Duration,
    max_item_count: usize,
    max_buffer_size_bytes: usize,
    enabled: bool,
    metadata: BatchMetadata,
    before_send: Option<BeforeSend<I>>,
    on_batch: OnBatch,
    queue: Arc<dyn DispatchQueue + Send + Sync>,
    metrics: InternalMetrics,
    state: Mutex<State>,
}

struct State {
    buffer: Box<dyn Buffer + Send>,
    timer: Option<Scheduled>,
    // Incremented each time a timer is armed so a timer that
    // fires after its batch was already flushed can tell
    epoch: u64,
}

struct Batch {
    data: Vec<u8>,
    count: usize,
}

impl<I: Item + 'static> Batcher<I> {
    /**
    Start building a batcher that delivers batches to `on_batch`.
    */
    pub fn builder(
        on_batch: impl Fn(Vec<u8>, usize) + Send + Sync + 'static,
    ) -> BatcherBuilder<I> {
        BatcherBuilder::new(on_batch)
    }

    /**
    Enrich, encode, and buffer an item.

    Items are silently discarded if the batcher is disabled or the `before_send` hook drops them. This method only fails if the item can't be encoded, or if it's too large to fit in an empty buffer.
    */
    pub fn add_item(&self, item: I, scope: &ScopeSnapshot) -> Result<(), Error> {
        if !self.shared.enabled {
            return Ok(());
        }

        let item = enrich::enriched(item, scope, &self.shared.metadata);

        let item = match self.shared.before_send {
            Some(ref before_send) => match before_send(item) {
                Some(item) => item,
                None => {
                    self.shared.metrics.item_dropped.increment();

                    emit::debug!(
                        rt: emit::runtime::internal(),
                        "item dropped by before_send",
                    );

                    return Ok(());
                }
            },
            None => item,
        };

        let encoded = match encode::encode(&item) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.shared.metrics.item_encode_failed.increment();

                emit::warn!(
                    rt: emit::runtime::internal(),
                    "failed to encode item: {err}",
                    err,
                );

                return Err(Error::encode(err));
            }
        };

        let mut state = self.shared.lock();

        // If the item doesn't fit then flush what's there to make room
        let mut pending = None;
        if !state.buffer.push(&encoded) {
            pending = self.shared.take_batch(&mut state);

            if !state.buffer.push(&encoded) {
                drop(state);

                self.shared.metrics.item_capacity_rejected.increment();
                self.shared.deliver(pending);

                emit::warn!(
                    rt: emit::runtime::internal(),
                    "discarding an item of {size} bytes that doesn't fit in an empty buffer",
                    size: encoded.len(),
                );

                return Err(Error::capacity(encoded.len()));
            }
        }

        if state.buffer.len() >= self.shared.max_item_count
            || state.buffer.size_bytes() >= self.shared.max_buffer_size_bytes
        {
            let batch = self.shared.take_batch(&mut state);
            drop(state);

            self.shared.deliver(pending);
            self.shared.deliver(batch);

            return Ok(());
        }

        if state.timer.is_none() {
            self.arm_timer(&mut state);
        }

        drop(state);
        self.shared.deliver(pending);

        Ok(())
    }

    fn arm_timer(&self, state: &mut State) {
        state.epoch = state.epoch.wrapping_add(1);

        let epoch = state.epoch;
        let shared = Arc::downgrade(&self.shared);

        state.timer = Some(self.shared.queue.schedule(
            self.shared.flush_timeout,
            Box::new(move || Shared::flush_on_timer(shared, epoch)),
        ));
    }
}

impl<I> Batcher<I> {
    /**
    Deliver any buffered items now.

    Any pending timed flush is cancelled. If the buffer is empty the callback isn't invoked. Returns how long producing and delivering the batch took.
    */
    pub fn flush(&self) -> Duration {
        let start = Instant::now();

        let mut state = self.shared.lock();
        let batch = self.shared.take_batch(&mut state);
        drop(state);

        if batch.is_none() {
            return Duration::ZERO;
        }

        self.shared.deliver(batch);

        start.elapsed()
    }

    /**
    The number of items currently buffered.
    */
    pub fn items_count(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    /**
    The number of bytes currently buffered, excluding the batch framing.
    */
    pub fn size_bytes(&self) -> usize {
        self.shared.lock().buffer.size_bytes()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled
    }

    /**
    Sample the batcher's internal counters.
    */
    pub fn sample_metrics(&self) -> impl Iterator<Item = (&'static str, usize)> + 'static {
        self.shared.metrics.sample()
    }
}

impl<I> Shared<I> {
    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn flush_on_timer(shared: Weak<Self>, epoch: u64) {
        let Some(shared) = shared.upgrade() else {
            return;
        };

        let mut state = shared.lock();

        // If the batch this timer was armed for has already been flushed then there's nothing to do
        if state.epoch != epoch || state.timer.is_none() {
            return;
        }

        shared.metrics.flush_timer_fired.increment();

        state.timer = None;
        let batch = shared.take_batch(&mut state);
        drop(state);

        shared.deliver(batch);
    }

    fn take_batch(&self, state: &mut State) -> Option<Batch> {
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        take_batch(&mut *state.buffer)
    }

    fn deliver(&self, batch: Option<Batch>) {
        let Some(Batch { data, count }) = batch else {
            return;
        };

        let size = data.len();

        match panic::catch_unwind(AssertUnwindSafe(|| (self.on_batch)(data, count))) {
            Ok(()) => {
                self.metrics.batch_flushed.increment();

                emit::debug!(
                    rt: emit::runtime::internal(),
                    "flushed a batch of {count} items ({size} bytes)",
                    count,
                    size,
                );
            }
            Err(_) => {
                self.metrics.batch_panicked.increment();

                emit::warn!(
                    rt: emit::runtime::internal(),
                    "batch callback panicked; {count} items were lost",
                    count,
                );
            }
        }
    }
}

fn take_batch(buffer: &mut (impl Buffer + ?Sized)) -> Option<Batch> {
    if buffer.is_empty() {
        return None;
    }

    let batch = Batch {
        data: buffer.batched_data(),
        count: buffer.len(),
    };

    buffer.clear();

    Some(batch)
}

impl<I> Drop for Shared<I> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|err| err.into_inner());

        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        let batch = take_batch(&mut *state.buffer);
        self.deliver(batch);
    }
}

/**
An error encountered while buffering an item.
*/
pub struct Error {
    kind: ErrorKind,
    inner: Box<dyn std::error::Error + Send + Sync>,
}

/**
The general category of an [`Error`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /**
    The item couldn't be encoded.
    */
    Encode,
    /**
    The item was too large for the buffer.
    */
    Capacity,
    /**
    A background queue couldn't be started.
    */
    Spawn,
}

impl Error {
    fn new(kind: ErrorKind, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error {
            kind,
            inner: Box::new(err),
        }
    }

    pub(crate) fn encode(err: EncodeError) -> Self {
        Error::new(ErrorKind::Encode, err)
    }

    pub(crate) fn capacity(size: usize) -> Self {
        Error::new(ErrorKind::Capacity, CapacityError { size })
    }

    pub(crate) fn spawn(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Spawn, err)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}

#[derive(Debug)]
struct CapacityError {
    size: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "an item of {} bytes doesn't fit in the buffer",
            self.size
        )
    }
}

impl std::error::Error for CapacityError {}
