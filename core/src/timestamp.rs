/*!
The [`Timestamp`] type.

Timestamps are points in time relative to the Unix epoch. They're serialized as fractional seconds since the epoch, like `1718000000.123456`.
*/

use core::{fmt, time::Duration};

/**
A point in time, stored as a [`Duration`] since the Unix epoch.
*/
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    /**
    The Unix epoch itself.
    */
    pub const UNIX_EPOCH: Timestamp = Timestamp(Duration::ZERO);

    pub const fn from_unix(unix_time: Duration) -> Self {
        Timestamp(unix_time)
    }

    /**
    Create a timestamp from fractional seconds since the Unix epoch.

    Negative or non-finite values produce `None`.
    */
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }

        Duration::try_from_secs_f64(secs).ok().map(Timestamp)
    }

    pub fn to_unix(&self) -> Duration {
        self.0
    }

    /**
    The fractional number of seconds since the Unix epoch.

    This is the value written into encoded items.
    */
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn duration_since(self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }

    pub fn to_system_time(&self) -> std::time::SystemTime {
        std::time::SystemTime::UNIX_EPOCH + self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:09}", self.0.as_secs(), self.0.subsec_nanos())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl sval::Value for Timestamp {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        stream.f64(self.as_secs_f64())
    }
}
