#[cfg(test)]
use mockall::automock;
use time::OffsetDateTime;

/// Source of evaluation timestamps. Read once per request.
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock, truncated to whole milliseconds so a timestamp survives a round trip through any
/// store without losing precision.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        now.replace_millisecond(now.millisecond()).unwrap_or(now)
    }
}
