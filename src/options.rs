use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::Duration,
};

use satchel_batcher::{Batcher, DispatchQueue, ThreadQueue};
use satchel_core::{
    scope::{SdkInfo, DEFAULT_ENVIRONMENT},
    BatchMetadata, Clock, Log, Metric, ScopeProvider, ScopeSnapshot, SystemClock,
};
use satchel_store::{EnvelopeStore, OnItemDeleted};

use crate::{
    installation::InstallationId,
    producer::{Logs, Metrics},
    Error,
};

type BeforeSend<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

const ENVELOPES_DIR: &str = "envelopes";

/**
Configuration for producing and storing telemetry.

Use [`crate::options`] to begin an [`Options`]. Once configured, call [`Options::metrics`] or [`Options::logs`] to start a batching producer, and [`Options::envelope_store`] to open a persistent envelope queue.
*/
pub struct Options {
    environment: String,
    release: Option<String>,
    sdk: SdkInfo,
    send_default_pii: bool,
    enable_metrics: bool,
    enable_logs: bool,
    flush_timeout: Duration,
    max_item_count: usize,
    max_buffer_size_bytes: usize,
    max_envelopes: usize,
    installation_id: InstallationId,
    before_send_metric: Option<BeforeSend<Metric>>,
    before_send_log: Option<BeforeSend<Log>>,
    scope: Arc<dyn ScopeProvider + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    queue: Option<Arc<dyn DispatchQueue + Send + Sync>>,
    default_queue: OnceLock<Arc<dyn DispatchQueue + Send + Sync>>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /**
    Create options with the following defaults:

    - Environment `production`.
    - No release.
    - Personally identifiable information isn't sent.
    - Metrics are enabled, logs are disabled.
    - Flush after 5s, 100 items, or 1MiB.
    - Keep 100 envelopes.
    - No cache directory.
    */
    pub fn new() -> Self {
        Options {
            environment: String::from(DEFAULT_ENVIRONMENT),
            release: None,
            sdk: SdkInfo::default(),
            send_default_pii: false,
            enable_metrics: true,
            enable_logs: false,
            flush_timeout: satchel_batcher::DEFAULT_FLUSH_TIMEOUT,
            max_item_count: satchel_batcher::DEFAULT_MAX_ITEM_COUNT,
            max_buffer_size_bytes: satchel_batcher::DEFAULT_MAX_BUFFER_SIZE_BYTES,
            max_envelopes: satchel_store::DEFAULT_MAX_ENVELOPES,
            installation_id: InstallationId::new(None),
            before_send_metric: None,
            before_send_log: None,
            scope: Arc::new(ScopeSnapshot::default()),
            clock: Arc::new(SystemClock::new()),
            queue: None,
            default_queue: OnceLock::new(),
        }
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    /**
    The SDK name and version reported on every item.
    */
    pub fn sdk(mut self, sdk: SdkInfo) -> Self {
        self.sdk = sdk;
        self
    }

    /**
    Whether personal information may be gathered beyond what's set on the scope.

    The flag is carried on each scope snapshot. User details set explicitly on the scope are always attached.
    */
    pub fn send_default_pii(mut self, send_default_pii: bool) -> Self {
        self.send_default_pii = send_default_pii;
        self
    }

    pub fn enable_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    pub fn enable_logs(mut self, enable_logs: bool) -> Self {
        self.enable_logs = enable_logs;
        self
    }

    /**
    How long producers wait after their first buffered item before flushing.
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
    The maximum number of envelopes kept in the envelope store.
    */
    pub fn max_envelopes(mut self, max_envelopes: usize) -> Self {
        self.max_envelopes = max_envelopes;
        self
    }

    /**
    A directory for state that should survive restarts.

    The installation id and envelope store live here.
    */
    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.installation_id = InstallationId::new(Some(cache_dir.into()));
        self
    }

    /**
    A hook that runs on every enriched metric before it's buffered.

    Return `None` to discard the metric.
    */
    pub fn before_send_metric(
        mut self,
        before_send: impl Fn(Metric) -> Option<Metric> + Send + Sync + 'static,
    ) -> Self {
        self.before_send_metric = Some(Arc::new(before_send));
        self
    }

    /**
    A hook that runs on every enriched log before it's buffered.

    Return `None` to discard the log.
    */
    pub fn before_send_log(
        mut self,
        before_send: impl Fn(Log) -> Option<Log> + Send + Sync + 'static,
    ) -> Self {
        self.before_send_log = Some(Arc::new(before_send));
        self
    }

    /**
    Where producers get the scope to enrich items with.
    */
    pub fn scope(mut self, scope: impl ScopeProvider + Send + Sync + 'static) -> Self {
        self.scope = Arc::new(scope);
        self
    }

    /**
    The clock used to timestamp items.
    */
    pub fn clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /**
    The queue producers schedule timed flushes on.

    If no queue is given then a single [`ThreadQueue`] is spawned and shared by all producers created from these options.
    */
    pub fn queue(mut self, queue: impl DispatchQueue + Send + Sync + 'static) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    /**
    The installation id, reading or generating it if needed.
    */
    pub fn installation_id(&self) -> &str {
        self.installation_id.get()
    }

    /**
    The values injected into every item by producers created from these options.
    */
    pub fn batch_metadata(&self) -> BatchMetadata {
        BatchMetadata {
            sdk: self.sdk.clone(),
            environment: self.environment.clone(),
            release_name: self.release.clone(),
            installation_id: Some(self.installation_id().to_owned()),
        }
    }

    /**
    Start a metrics producer that delivers batches to `on_batch`.
    */
    pub fn metrics(
        &self,
        on_batch: impl Fn(Vec<u8>, usize) + Send + Sync + 'static,
    ) -> Result<Metrics, Error> {
        let mut builder = Batcher::<Metric>::builder(on_batch)
            .enabled(self.enable_metrics)
            .flush_timeout(self.flush_timeout)
            .max_item_count(self.max_item_count)
            .max_buffer_size_bytes(self.max_buffer_size_bytes)
            .metadata(self.batch_metadata())
            .queue(self.dispatch_queue()?);

        if let Some(ref before_send) = self.before_send_metric {
            let before_send = before_send.clone();
            builder = builder.before_send(move |metric| before_send(metric));
        }

        Ok(Metrics::new(
            builder.spawn().map_err(Error::new)?,
            self.scope.clone(),
            self.clock.clone(),
            self.send_default_pii,
        ))
    }

    /**
    Start a logs producer that delivers batches to `on_batch`.
    */
    pub fn logs(
        &self,
        on_batch: impl Fn(Vec<u8>, usize) + Send + Sync + 'static,
    ) -> Result<Logs, Error> {
        let mut builder = Batcher::<Log>::builder(on_batch)
            .enabled(self.enable_logs)
            .flush_timeout(self.flush_timeout)
            .max_item_count(self.max_item_count)
            .max_buffer_size_bytes(self.max_buffer_size_bytes)
            .metadata(self.batch_metadata())
            .queue(self.dispatch_queue()?);

        if let Some(ref before_send) = self.before_send_log {
            let before_send = before_send.clone();
            builder = builder.before_send(move |log| before_send(log));
        }

        Ok(Logs::new(
            builder.spawn().map_err(Error::new)?,
            self.scope.clone(),
            self.clock.clone(),
            self.send_default_pii,
        ))
    }

    /**
    Open the envelope store in the cache directory.

    Items evicted from the store are reported to `on_item_deleted`.
    */
    pub fn envelope_store(
        &self,
        on_item_deleted: impl OnItemDeleted + Send + Sync + 'static,
    ) -> Result<EnvelopeStore, Error> {
        let dir = self
            .installation_id
            .cache_dir()
            .map(|cache_dir| cache_dir.join(ENVELOPES_DIR))
            .ok_or_else(|| Error::new("a cache directory is needed to store envelopes"))?;

        EnvelopeStore::builder(dir)
            .max_envelopes(self.max_envelopes)
            .clock(self.clock.clone())
            .on_item_deleted(on_item_deleted)
            .open()
            .map_err(Error::new)
    }

    fn dispatch_queue(&self) -> Result<Arc<dyn DispatchQueue + Send + Sync>, Error> {
        if let Some(ref queue) = self.queue {
            return Ok(queue.clone());
        }

        if let Some(queue) = self.default_queue.get() {
            return Ok(queue.clone());
        }

        let queue: Arc<dyn DispatchQueue + Send + Sync> =
            Arc::new(ThreadQueue::spawn().map_err(Error::new)?);

        Ok(self.default_queue.get_or_init(|| queue).clone())
    }
}
