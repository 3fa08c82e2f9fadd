/*!
Core data model for `satchel`.

This crate defines the telemetry items that flow through the rest of the pipeline, the read-only scope views used to enrich them, and their JSON encoding. It has no background work or IO of its own.
*/

pub mod attribute;
pub mod clock;
pub mod encode;
pub mod enrich;
pub mod id;
pub mod item;
pub mod scope;
pub mod timestamp;
pub mod well_known;

pub use self::{
    attribute::{Attribute, Attributes},
    clock::{Clock, SystemClock},
    encode::EncodeError,
    id::{SpanId, TraceId},
    item::{Item, Log, LogLevel, Metric, MetricValue},
    scope::{BatchMetadata, ScopeProvider, ScopeSnapshot},
    timestamp::Timestamp,
};
