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
    item_dropped: Counter -> "item_dropped",
    item_encode_failed: Counter -> "item_encode_failed",
    item_capacity_rejected: Counter -> "item_capacity_rejected",
    batch_flushed: Counter -> "batch_flushed",
    batch_panicked: Counter -> "batch_panicked",
    flush_timer_fired: Counter -> "flush_timer_fired",
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
