use crate::types::UnixSeconds;
use chrono::Utc;

/// Wall-clock source in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixSeconds;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixSeconds {
        u64::try_from(Utc::now().timestamp()).unwrap_or_default()
    }
}

impl<F> Clock for F
where
    F: Fn() -> UnixSeconds + Send + Sync,
{
    fn now(&self) -> UnixSeconds {
        self()
    }
}
