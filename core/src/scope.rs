/*!
Read-only views of ambient state consumed by enrichment.

A [`ScopeSnapshot`] is taken from the live scope at capture time and handed to [`crate::enrich::enrich`] by value. Enrichment never sees or mutates the live scope.
*/

use crate::{
    attribute::Attributes,
    id::{SpanId, TraceId},
};

/**
The user associated with the current scope.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/**
Operating system context.

Each field is independently optional.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsContext {
    pub name: Option<String>,
    pub version: Option<String>,
}

/**
Device context.

Each field is independently optional.
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceContext {
    pub model: Option<String>,
    pub family: Option<String>,
}

/**
A point-in-time copy of the ambient scope.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeSnapshot {
    pub user: Option<User>,
    pub span_id: Option<SpanId>,
    pub os: Option<OsContext>,
    pub device: Option<DeviceContext>,
    pub attributes: Attributes,
    pub trace_id: TraceId,
    pub replay_id: Option<String>,
    pub send_default_pii: bool,
}

impl ScopeSnapshot {
    /**
    Create an empty snapshot that propagates the given trace.
    */
    pub fn new(trace_id: TraceId) -> Self {
        ScopeSnapshot {
            user: None,
            span_id: None,
            os: None,
            device: None,
            attributes: Attributes::new(),
            trace_id,
            replay_id: None,
            send_default_pii: false,
        }
    }
}

impl Default for ScopeSnapshot {
    /**
    An empty snapshot with a freshly generated trace id.
    */
    fn default() -> Self {
        ScopeSnapshot::new(TraceId::random())
    }
}

/**
Something that can produce a [`ScopeSnapshot`] on demand.
*/
pub trait ScopeProvider {
    fn snapshot(&self) -> ScopeSnapshot;
}

impl ScopeProvider for ScopeSnapshot {
    fn snapshot(&self) -> ScopeSnapshot {
        self.clone()
    }
}

impl<F: Fn() -> ScopeSnapshot> ScopeProvider for F {
    fn snapshot(&self) -> ScopeSnapshot {
        self()
    }
}

/**
The name and version of the SDK producing items.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
}

impl Default for SdkInfo {
    fn default() -> Self {
        SdkInfo {
            name: String::from("sentry.rust.satchel"),
            version: String::from(env!("CARGO_PKG_VERSION")),
        }
    }
}

/**
Per-batcher values that enrichment injects into every item.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMetadata {
    pub sdk: SdkInfo,
    pub environment: String,
    pub release_name: Option<String>,
    pub installation_id: Option<String>,
}

pub const DEFAULT_ENVIRONMENT: &'static str = "production";

impl Default for BatchMetadata {
    fn default() -> Self {
        BatchMetadata {
            sdk: SdkInfo::default(),
            environment: String::from(DEFAULT_ENVIRONMENT),
            release_name: None,
            installation_id: None,
        }
    }
}
