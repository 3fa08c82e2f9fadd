/*!
The [`Item`] trait and the item kinds that implement it.

An item is a single telemetry record that can be enriched with scope data and batched. There are two kinds:

- [`Metric`]: a named counter, gauge, or distribution value.
- [`Log`]: a leveled log line.

Items are mutable while they're being built and enriched. Once encoded they're treated as immutable bytes.
*/

use crate::{
    attribute::{Attribute, Attributes},
    encode::stream_f64,
    id::TraceId,
    timestamp::Timestamp,
    well_known::{METRIC_TYPE_COUNTER, METRIC_TYPE_DISTRIBUTION, METRIC_TYPE_GAUGE},
};

/**
A telemetry record that can be enriched and batched.
*/
pub trait Item: sval::Value {
    fn attributes(&self) -> &Attributes;

    fn attributes_mut(&mut self) -> &mut Attributes;

    fn trace_id(&self) -> Option<TraceId>;

    fn set_trace_id(&mut self, trace_id: TraceId);
}

/**
The value of a [`Metric`].
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
    Distribution(f64),
}

impl MetricValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::Counter(_) => METRIC_TYPE_COUNTER,
            MetricValue::Gauge(_) => METRIC_TYPE_GAUGE,
            MetricValue::Distribution(_) => METRIC_TYPE_DISTRIBUTION,
        }
    }
}

impl sval::Value for MetricValue {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        match self {
            MetricValue::Counter(v) => stream.u64(*v),
            MetricValue::Gauge(v) | MetricValue::Distribution(v) => stream_f64(stream, *v),
        }
    }
}

/**
A metric sample.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub timestamp: Timestamp,
    pub trace_id: Option<TraceId>,
    pub name: String,
    pub value: MetricValue,
    pub unit: Option<String>,
    pub attributes: Attributes,
}

impl Metric {
    pub fn new(timestamp: Timestamp, name: impl Into<String>, value: MetricValue) -> Self {
        Metric {
            timestamp,
            trace_id: None,
            name: name.into(),
            value,
            unit: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Attribute>) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

impl Item for Metric {
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    fn trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }

    fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = Some(trace_id);
    }
}

const TIMESTAMP_LABEL: sval::Label = sval::Label::new("timestamp");
const TRACE_ID_LABEL: sval::Label = sval::Label::new("trace_id");
const NAME_LABEL: sval::Label = sval::Label::new("name");
const VALUE_LABEL: sval::Label = sval::Label::new("value");
const TYPE_LABEL: sval::Label = sval::Label::new("type");
const UNIT_LABEL: sval::Label = sval::Label::new("unit");
const ATTRIBUTES_LABEL: sval::Label = sval::Label::new("attributes");
const LEVEL_LABEL: sval::Label = sval::Label::new("level");
const BODY_LABEL: sval::Label = sval::Label::new("body");
const SEVERITY_NUMBER_LABEL: sval::Label = sval::Label::new("severity_number");

fn stream_field<'sval, S: sval::Stream<'sval> + ?Sized>(
    stream: &mut S,
    label: &sval::Label,
    f: impl FnOnce(&mut S) -> sval::Result,
) -> sval::Result {
    stream.record_value_begin(None, label)?;
    f(&mut *stream)?;
    stream.record_value_end(None, label)
}

impl sval::Value for Metric {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.record_begin(None, None, None, None)?;

        stream_field(&mut *stream, &TIMESTAMP_LABEL, |stream| {
            stream.value(&self.timestamp)
        })?;

        if let Some(trace_id) = self.trace_id {
            stream_field(&mut *stream, &TRACE_ID_LABEL, |stream| {
                sval::stream_display(&mut *stream, trace_id)
            })?;
        }

        stream_field(&mut *stream, &NAME_LABEL, |stream| stream.value(&*self.name))?;
        stream_field(&mut *stream, &VALUE_LABEL, |stream| stream.value(&self.value))?;
        stream_field(&mut *stream, &TYPE_LABEL, |stream| {
            stream.value(self.value.type_name())
        })?;

        if let Some(unit) = &self.unit {
            stream_field(&mut *stream, &UNIT_LABEL, |stream| stream.value(&**unit))?;
        }

        stream_field(&mut *stream, &ATTRIBUTES_LABEL, |stream| {
            stream.value(&self.attributes)
        })?;

        stream.record_end(None, None, None)
    }
}

/**
The severity of a [`Log`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    /**
    The OpenTelemetry severity number for the lowest severity in this level's range.
    */
    pub fn severity_number(&self) -> u8 {
        match self {
            LogLevel::Trace => 1,
            LogLevel::Debug => 5,
            LogLevel::Info => 9,
            LogLevel::Warn => 13,
            LogLevel::Error => 17,
            LogLevel::Fatal => 21,
        }
    }
}

/**
A log record.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Log {
    pub timestamp: Timestamp,
    pub trace_id: Option<TraceId>,
    pub level: LogLevel,
    pub body: String,
    pub attributes: Attributes,
}

impl Log {
    pub fn new(timestamp: Timestamp, level: LogLevel, body: impl Into<String>) -> Self {
        Log {
            timestamp,
            trace_id: None,
            level,
            body: body.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Attribute>) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

impl Item for Log {
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    fn trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }

    fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = Some(trace_id);
    }
}

impl sval::Value for Log {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.record_begin(None, None, None, None)?;

        stream_field(&mut *stream, &TIMESTAMP_LABEL, |stream| {
            stream.value(&self.timestamp)
        })?;

        if let Some(trace_id) = self.trace_id {
            stream_field(&mut *stream, &TRACE_ID_LABEL, |stream| {
                sval::stream_display(&mut *stream, trace_id)
            })?;
        }

        stream_field(&mut *stream, &LEVEL_LABEL, |stream| {
            stream.value(self.level.as_str())
        })?;
        stream_field(&mut *stream, &BODY_LABEL, |stream| stream.value(&*self.body))?;
        stream_field(&mut *stream, &SEVERITY_NUMBER_LABEL, |stream| {
            stream.u8(self.level.severity_number())
        })?;
        stream_field(&mut *stream, &ATTRIBUTES_LABEL, |stream| {
            stream.value(&self.attributes)
        })?;

        stream.record_end(None, None, None)
    }
}
