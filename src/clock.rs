//! Time source used to compute token expiration.

use chrono::{DateTime, FixedOffset, Local};

/// Supplies the current instant. Injected so expiration arithmetic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the host's local offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().into()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_returns_same_instant() {
        let instant = DateTime::parse_from_rfc3339("2024-05-01T08:30:00+02:00").unwrap();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = chrono::Utc::now();
        let now = SystemClock.now().with_timezone(&chrono::Utc);
        let after = chrono::Utc::now();
        assert!(now >= before && now <= after);
    }
}
