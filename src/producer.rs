/*!
Handles for producing metrics and logs.
*/

use std::{sync::Arc, time::Duration};

use satchel_batcher::{Batcher, Error};
use satchel_core::{
    Attributes, Clock, Log, LogLevel, Metric, MetricValue, ScopeProvider, ScopeSnapshot,
};

/**
A producer of metrics.

Each metric is timestamped, enriched with a snapshot of the current scope, and buffered until its batch is flushed. Cloning a `Metrics` produces another handle to the same batch.
*/
#[derive(Clone)]
pub struct Metrics {
    batcher: Batcher<Metric>,
    scope: Arc<dyn ScopeProvider + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    send_default_pii: bool,
}

impl Metrics {
    pub(crate) fn new(
        batcher: Batcher<Metric>,
        scope: Arc<dyn ScopeProvider + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        send_default_pii: bool,
    ) -> Self {
        Metrics {
            batcher,
            scope,
            clock,
            send_default_pii,
        }
    }

    /**
    Record an increment of a counter.
    */
    pub fn count(
        &self,
        name: impl Into<String>,
        value: u64,
        unit: Option<&str>,
        attributes: Attributes,
    ) -> Result<(), Error> {
        self.record(name, MetricValue::Counter(value), unit, attributes)
    }

    /**
    Record the current value of a gauge.
    */
    pub fn gauge(
        &self,
        name: impl Into<String>,
        value: f64,
        unit: Option<&str>,
        attributes: Attributes,
    ) -> Result<(), Error> {
        self.record(name, MetricValue::Gauge(value), unit, attributes)
    }

    /**
    Record a sample of a distribution.
    */
    pub fn distribution(
        &self,
        name: impl Into<String>,
        value: f64,
        unit: Option<&str>,
        attributes: Attributes,
    ) -> Result<(), Error> {
        self.record(name, MetricValue::Distribution(value), unit, attributes)
    }

    /**
    Buffer a metric that's already been built.
    */
    pub fn capture(&self, metric: Metric) -> Result<(), Error> {
        self.batcher.add_item(metric, &self.snapshot())
    }

    /**
    Deliver any buffered metrics now, returning how long it took.
    */
    pub fn capture_metrics(&self) -> Duration {
        self.batcher.flush()
    }

    pub fn batcher(&self) -> &Batcher<Metric> {
        &self.batcher
    }

    fn record(
        &self,
        name: impl Into<String>,
        value: MetricValue,
        unit: Option<&str>,
        attributes: Attributes,
    ) -> Result<(), Error> {
        let mut metric = Metric::new(self.clock.now(), name, value);

        metric.unit = unit.map(String::from);
        metric.attributes = attributes;

        self.capture(metric)
    }

    fn snapshot(&self) -> ScopeSnapshot {
        snapshot(&*self.scope, self.send_default_pii)
    }
}

/**
A producer of logs.

Cloning a `Logs` produces another handle to the same batch.
*/
#[derive(Clone)]
pub struct Logs {
    batcher: Batcher<Log>,
    scope: Arc<dyn ScopeProvider + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
    send_default_pii: bool,
}

impl Logs {
    pub(crate) fn new(
        batcher: Batcher<Log>,
        scope: Arc<dyn ScopeProvider + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        send_default_pii: bool,
    ) -> Self {
        Logs {
            batcher,
            scope,
            clock,
            send_default_pii,
        }
    }

    /**
    Record a log at the given level.
    */
    pub fn log(
        &self,
        level: LogLevel,
        body: impl Into<String>,
        attributes: Attributes,
    ) -> Result<(), Error> {
        let mut log = Log::new(self.clock.now(), level, body);
        log.attributes = attributes;

        self.capture(log)
    }

    /**
    Buffer a log that's already been built.
    */
    pub fn capture(&self, log: Log) -> Result<(), Error> {
        self.batcher
            .add_item(log, &snapshot(&*self.scope, self.send_default_pii))
    }

    /**
    Deliver any buffered logs now, returning how long it took.
    */
    pub fn flush(&self) -> Duration {
        self.batcher.flush()
    }

    pub fn batcher(&self) -> &Batcher<Log> {
        &self.batcher
    }
}

fn snapshot(scope: &(dyn ScopeProvider + Send + Sync), send_default_pii: bool) -> ScopeSnapshot {
    let mut snapshot = scope.snapshot();
    snapshot.send_default_pii = send_default_pii;

    snapshot
}
