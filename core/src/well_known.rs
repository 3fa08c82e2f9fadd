/*!
Attribute keys with a known meaning.

These are the keys scope enrichment writes onto items.
*/

pub const KEY_SDK_NAME: &'static str = "sentry.sdk.name";
pub const KEY_SDK_VERSION: &'static str = "sentry.sdk.version";
pub const KEY_ENVIRONMENT: &'static str = "sentry.environment";
pub const KEY_RELEASE: &'static str = "sentry.release";
pub const KEY_REPLAY_ID: &'static str = "sentry.replay_id";

pub const KEY_SPAN_ID: &'static str = "span_id";

pub const KEY_OS_NAME: &'static str = "os.name";
pub const KEY_OS_VERSION: &'static str = "os.version";

pub const KEY_DEVICE_BRAND: &'static str = "device.brand";
pub const KEY_DEVICE_MODEL: &'static str = "device.model";
pub const KEY_DEVICE_FAMILY: &'static str = "device.family";

pub const KEY_USER_ID: &'static str = "user.id";
pub const KEY_USER_NAME: &'static str = "user.name";
pub const KEY_USER_EMAIL: &'static str = "user.email";

/**
The brand written alongside a device model.

Device models reported through the scope's device context are Apple hardware identifiers.
*/
pub const DEVICE_BRAND_APPLE: &'static str = "Apple";

pub const ATTRIBUTE_TYPE_STRING: &'static str = "string";
pub const ATTRIBUTE_TYPE_INTEGER: &'static str = "integer";
pub const ATTRIBUTE_TYPE_BOOLEAN: &'static str = "boolean";
pub const ATTRIBUTE_TYPE_DOUBLE: &'static str = "double";

pub const METRIC_TYPE_COUNTER: &'static str = "counter";
pub const METRIC_TYPE_GAUGE: &'static str = "gauge";
pub const METRIC_TYPE_DISTRIBUTION: &'static str = "distribution";
