/*!
The [`Clock`] type.

Components that need the current time take a [`Clock`] at construction instead of reading the system time directly, so tests can control it.
*/

use std::sync::{Arc, Mutex};

use crate::timestamp::Timestamp;

/**
A source of the current time.
*/
pub trait Clock {
    fn now(&self) -> Timestamp;
}

impl<'a, T: Clock + ?Sized> Clock for &'a T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<'a, T: Clock + ?Sized + 'a> Clock for Box<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<'a, T: Clock + ?Sized + 'a> Clock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/**
A [`Clock`] based on the system's wall clock.
*/
#[derive(Default, Debug, Clone, Copy)]
pub struct SystemClock {}

impl SystemClock {
    pub const fn new() -> Self {
        SystemClock {}
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix(std::time::UNIX_EPOCH.elapsed().unwrap_or_default())
    }
}

/**
A [`Clock`] that only moves when told to.
*/
#[derive(Debug, Default)]
pub struct ManualClock(Mutex<Timestamp>);

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        ManualClock(Mutex::new(now))
    }

    pub fn set(&self, now: Timestamp) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *now = Timestamp::from_unix(now.to_unix() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}
