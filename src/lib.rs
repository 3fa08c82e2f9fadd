/*!
Telemetry buffering and a persistent envelope queue for client SDKs.

`satchel` accepts small structured records from anywhere in an application, enriches them with ambient scope, and hands them off in batches to a transport. Separately, it keeps a bounded on-disk queue of envelopes waiting to be sent.

The pieces live in their own crates and are re-exported here:

- [`satchel_core`]: the item model, scope snapshots, and enrichment.
- [`batcher`]: buffers and the scheduler that decides when to flush them.
- [`store`]: the on-disk envelope queue.

# Getting started

Configure [`Options`] and start a producer:

```
use satchel::{Attributes, ScopeSnapshot};

let options = satchel::options()
    .environment("staging")
    .release("my-app@1.0.0")
    .scope(ScopeSnapshot::default());

let metrics = options.metrics(|batch: Vec<u8>, count: usize| {
    // Hand `batch` off to a transport
    # let _ = (batch, count);
})?;

metrics.count("button_click", 1, None, Attributes::new())?;

metrics.capture_metrics();
# Ok::<(), Box<dyn std::error::Error>>(())
```

Batches are JSON documents of the form `{"items":[...]}`. They're delivered on a background thread once a flush timeout elapses, or on the calling thread once enough items or bytes are buffered.

# Storing envelopes

With a cache directory configured, envelopes can be persisted until they're sent:

```no_run
use satchel::store::{DataCategory, Envelope, EnvelopeItem};

let options = satchel::options().cache_dir("./target/satchel").max_envelopes(30);

let store = options.envelope_store(|item: &EnvelopeItem, category: DataCategory| {
    // Record that `item` was lost for rate limiting
    # let _ = (item, category);
})?;

store.store_envelope(&Envelope::new().with_item(EnvelopeItem::new("event", b"{}".to_vec())))?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::fmt;

mod installation;
mod options;
mod producer;

#[doc(inline)]
pub use satchel_core::*;

pub use satchel_batcher as batcher;
pub use satchel_store as store;

pub use self::{
    installation::InstallationId,
    options::Options,
    producer::{Logs, Metrics},
};

/**
Begin configuring [`Options`].
*/
pub fn options() -> Options {
    Options::new()
}

/**
An error attempting to start a producer or open a store.
*/
pub struct Error(Box<dyn std::error::Error + Send + Sync>);

impl Error {
    fn new(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error(e.into())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
