use std::sync::atomic::{AtomicUsize, Ordering};

macro_rules! metrics {
    ($container:ident { $($metric:ident: $kind:ident -> $label:literal,)* }) => {
        #[derive(Default)]
        pub(crate) struct $container {
            $(pub(crate) $metric: $kind,)*
        }

        impl $container {
            pub fn sample(&self) -> impl Iterator<Item = (&'static str, usize)> + 'static {
                let $container { $($metric,)* } = self;

                [$(($label, $metric.sample()),)*].into_iter()
            }
        }
    };
}

metrics!(InternalMetrics {
    envelope_write: Counter -> "envelope_write",
    envelope_write_failed: Counter -> "envelope_write_failed",
    envelope_evicted: Counter -> "envelope_evicted",
    envelope_delete_failed: Counter -> "envelope_delete_failed",
    envelope_read_failed: Counter -> "envelope_read_failed",
    session_init_migrated: Counter -> "session_init_migrated",
});

#[derive(Default)]
pub(crate) struct Counter(AtomicUsize);

impl Counter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}
