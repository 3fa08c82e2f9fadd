/*!
Scope enrichment.

[`enrich`] augments an item's attributes from a [`ScopeSnapshot`] and [`BatchMetadata`]. Attributes the item already carries always win: enrichment only ever fills in keys that are absent. The one exception is the item's trace id, which is always replaced by the scope's.
*/

use crate::{
    item::Item,
    scope::{BatchMetadata, ScopeSnapshot},
    well_known::{
        DEVICE_BRAND_APPLE, KEY_DEVICE_BRAND, KEY_DEVICE_FAMILY, KEY_DEVICE_MODEL,
        KEY_ENVIRONMENT, KEY_OS_NAME, KEY_OS_VERSION, KEY_RELEASE, KEY_SDK_NAME, KEY_SDK_VERSION,
        KEY_SPAN_ID, KEY_USER_EMAIL, KEY_USER_ID, KEY_USER_NAME,
    },
};

#[cfg(feature = "replay")]
use crate::well_known::KEY_REPLAY_ID;

/**
Enrich `item` in place.

The steps are applied in order:

1. SDK name, SDK version, and environment.
2. Release, if configured.
3. The active span id, if any.
4. OS name and version, each independently.
5. Device model (with its brand) and family, each independently.
6. User id, name, and email, each independently. If there's no user at all then the installation id is used as the user id.
7. The session replay id, if any.
8. Custom scope attributes.
9. The scope's trace id, unconditionally.
*/
pub fn enrich(item: &mut impl Item, scope: &ScopeSnapshot, metadata: &BatchMetadata) {
    let attributes = item.attributes_mut();

    attributes.insert_if_absent(KEY_SDK_NAME, &*metadata.sdk.name);
    attributes.insert_if_absent(KEY_SDK_VERSION, &*metadata.sdk.version);
    attributes.insert_if_absent(KEY_ENVIRONMENT, &*metadata.environment);

    if let Some(release) = &metadata.release_name {
        attributes.insert_if_absent(KEY_RELEASE, &**release);
    }

    if let Some(span_id) = scope.span_id {
        attributes.insert_if_absent(KEY_SPAN_ID, span_id.to_string());
    }

    if let Some(os) = &scope.os {
        if let Some(name) = &os.name {
            attributes.insert_if_absent(KEY_OS_NAME, &**name);
        }

        if let Some(version) = &os.version {
            attributes.insert_if_absent(KEY_OS_VERSION, &**version);
        }
    }

    if let Some(device) = &scope.device {
        if let Some(model) = &device.model {
            attributes.insert_if_absent(KEY_DEVICE_BRAND, DEVICE_BRAND_APPLE);
            attributes.insert_if_absent(KEY_DEVICE_MODEL, &**model);
        }

        if let Some(family) = &device.family {
            attributes.insert_if_absent(KEY_DEVICE_FAMILY, &**family);
        }
    }

    match &scope.user {
        Some(user) => {
            if let Some(id) = &user.id {
                attributes.insert_if_absent(KEY_USER_ID, &**id);
            }

            if let Some(name) = &user.name {
                attributes.insert_if_absent(KEY_USER_NAME, &**name);
            }

            if let Some(email) = &user.email {
                attributes.insert_if_absent(KEY_USER_EMAIL, &**email);
            }
        }
        // Only fall back when there's no user at all; a user without an id
        // is still an explicit identity
        None => {
            if let Some(installation_id) = &metadata.installation_id {
                attributes.insert_if_absent(KEY_USER_ID, &**installation_id);
            }
        }
    }

    #[cfg(feature = "replay")]
    {
        if let Some(replay_id) = &scope.replay_id {
            attributes.insert_if_absent(KEY_REPLAY_ID, &**replay_id);
        }
    }

    for (k, v) in scope.attributes.iter() {
        attributes.insert_if_absent(k, v.clone());
    }

    item.set_trace_id(scope.trace_id);
}

/**
Enrich `item`, returning it.
*/
pub fn enriched<I: Item>(mut item: I, scope: &ScopeSnapshot, metadata: &BatchMetadata) -> I {
    enrich(&mut item, scope, metadata);
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        attribute::Attribute,
        id::{SpanId, TraceId},
        item::{Log, LogLevel, Metric, MetricValue},
        scope::{DeviceContext, OsContext, User},
        timestamp::Timestamp,
    };

    fn trace_id() -> TraceId {
        "0af7651916cd43dd8448eb211c80319c".parse().unwrap()
    }

    fn metric() -> Metric {
        Metric::new(Timestamp::UNIX_EPOCH, "m", MetricValue::Counter(1))
    }

    fn metadata() -> BatchMetadata {
        BatchMetadata {
            environment: String::from("staging"),
            ..Default::default()
        }
    }

    fn str_attr<'a>(item: &'a impl Item, key: &str) -> Option<&'a str> {
        item.attributes().get(key).and_then(|v| v.as_str())
    }

    #[test]
    fn enrich_sets_sdk_and_environment() {
        let metric = enriched(metric(), &ScopeSnapshot::new(trace_id()), &metadata());

        assert_eq!(Some("sentry.rust.satchel"), str_attr(&metric, KEY_SDK_NAME));
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            str_attr(&metric, KEY_SDK_VERSION)
        );
        assert_eq!(Some("staging"), str_attr(&metric, KEY_ENVIRONMENT));
        assert_eq!(None, str_attr(&metric, KEY_RELEASE));
    }

    #[test]
    fn enrich_sets_release_when_present() {
        let metadata = BatchMetadata {
            release_name: Some(String::from("app@1.0.0")),
            ..metadata()
        };

        let metric = enriched(metric(), &ScopeSnapshot::new(trace_id()), &metadata);

        assert_eq!(Some("app@1.0.0"), str_attr(&metric, KEY_RELEASE));
    }

    #[test]
    fn enrich_sets_span_id() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.span_id = Some("b7ad6b7169203331".parse::<SpanId>().unwrap());

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(Some("b7ad6b7169203331"), str_attr(&metric, KEY_SPAN_ID));
    }

    #[test]
    fn enrich_os_fields_are_independent() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.os = Some(OsContext {
            name: None,
            version: Some(String::from("17.4")),
        });

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(None, str_attr(&metric, KEY_OS_NAME));
        assert_eq!(Some("17.4"), str_attr(&metric, KEY_OS_VERSION));
    }

    #[test]
    fn enrich_device_model_sets_brand() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.device = Some(DeviceContext {
            model: Some(String::from("iPhone15,2")),
            family: None,
        });

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(Some("Apple"), str_attr(&metric, KEY_DEVICE_BRAND));
        assert_eq!(Some("iPhone15,2"), str_attr(&metric, KEY_DEVICE_MODEL));
        assert_eq!(None, str_attr(&metric, KEY_DEVICE_FAMILY));
    }

    #[test]
    fn enrich_device_family_without_model() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.device = Some(DeviceContext {
            model: None,
            family: Some(String::from("iOS")),
        });

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(None, str_attr(&metric, KEY_DEVICE_BRAND));
        assert_eq!(Some("iOS"), str_attr(&metric, KEY_DEVICE_FAMILY));
    }

    #[test]
    fn enrich_user_fields() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.user = Some(User {
            id: Some(String::from("42")),
            name: Some(String::from("ada")),
            email: Some(String::from("ada@example.com")),
        });

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(Some("42"), str_attr(&metric, KEY_USER_ID));
        assert_eq!(Some("ada"), str_attr(&metric, KEY_USER_NAME));
        assert_eq!(Some("ada@example.com"), str_attr(&metric, KEY_USER_EMAIL));
    }

    #[test]
    fn enrich_user_fields_ignore_send_default_pii() {
        let mut scope = ScopeSnapshot::new(trace_id());
        assert!(!scope.send_default_pii);

        scope.user = Some(User {
            id: None,
            name: None,
            email: Some(String::from("ada@example.com")),
        });

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(None, str_attr(&metric, KEY_USER_ID));
        assert_eq!(None, str_attr(&metric, KEY_USER_NAME));
        assert_eq!(Some("ada@example.com"), str_attr(&metric, KEY_USER_EMAIL));
    }

    #[test]
    fn enrich_installation_id_fallback_without_user() {
        let metadata = BatchMetadata {
            installation_id: Some(String::from("install-1")),
            ..metadata()
        };

        let metric = enriched(metric(), &ScopeSnapshot::new(trace_id()), &metadata);

        assert_eq!(Some("install-1"), str_attr(&metric, KEY_USER_ID));
    }

    #[test]
    fn enrich_user_without_id_suppresses_fallback() {
        let metadata = BatchMetadata {
            installation_id: Some(String::from("install-1")),
            ..metadata()
        };

        let mut scope = ScopeSnapshot::new(trace_id());
        scope.user = Some(User {
            name: Some(String::from("ada")),
            ..Default::default()
        });

        let metric = enriched(metric(), &scope, &metadata);

        assert_eq!(None, str_attr(&metric, KEY_USER_ID));
        assert_eq!(Some("ada"), str_attr(&metric, KEY_USER_NAME));
    }

    #[cfg(feature = "replay")]
    #[test]
    fn enrich_sets_replay_id() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.replay_id = Some(String::from("replay-1"));

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(
            Some("replay-1"),
            str_attr(&metric, crate::well_known::KEY_REPLAY_ID)
        );
    }

    #[test]
    fn enrich_item_attributes_win() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.user = Some(User {
            id: Some(String::from("scope-user")),
            ..Default::default()
        });
        scope.attributes.insert("route", "/scope");
        scope.attributes.insert("tier", "gold");

        let metric = metric()
            .with_attribute(KEY_ENVIRONMENT, "item-env")
            .with_attribute(KEY_USER_ID, "item-user")
            .with_attribute("route", "/item");

        let metric = enriched(metric, &scope, &metadata());

        assert_eq!(Some("item-env"), str_attr(&metric, KEY_ENVIRONMENT));
        assert_eq!(Some("item-user"), str_attr(&metric, KEY_USER_ID));
        assert_eq!(Some("/item"), str_attr(&metric, "route"));
        assert_eq!(Some("gold"), str_attr(&metric, "tier"));
    }

    #[test]
    fn enrich_scope_attributes_keep_their_type() {
        let mut scope = ScopeSnapshot::new(trace_id());
        scope.attributes.insert("retries", 3i64);

        let metric = enriched(metric(), &scope, &metadata());

        assert_eq!(
            Some(&Attribute::Integer(3)),
            metric.attributes().get("retries")
        );
    }

    #[test]
    fn enrich_always_overwrites_trace_id() {
        let mut metric = metric();
        metric.set_trace_id(TraceId::from_u128(1).unwrap());

        let metric = enriched(metric, &ScopeSnapshot::new(trace_id()), &metadata());

        assert_eq!(Some(trace_id()), metric.trace_id());
    }

    #[test]
    fn enrich_applies_to_logs() {
        let log = Log::new(Timestamp::UNIX_EPOCH, LogLevel::Info, "hello");

        let log = enriched(log, &ScopeSnapshot::new(trace_id()), &metadata());

        assert_eq!(Some("staging"), str_attr(&log, KEY_ENVIRONMENT));
        assert_eq!(Some(trace_id()), log.trace_id());
    }
}
