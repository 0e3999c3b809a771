use chrono::{DateTime, Utc};

/// Time source injected into every component that reads the wall clock.
/// Production uses [`SystemClock`]; tests drive a manual clock so TTL and
/// duration logic can be exercised deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
