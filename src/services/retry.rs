//! Webhook retry schedule.
//!
//! A log gets at most `MAX_ATTEMPTS` deliveries. After the k-th failed
//! attempt (k < `MAX_ATTEMPTS`) the next one is scheduled `delays[k - 1]`
//! later.

use std::time::Duration;

/// Total delivery attempts per webhook log.
pub const MAX_ATTEMPTS: i32 = 5;

/// Delays between consecutive delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    /// 1 minute, 5 minutes, 30 minutes, 2 hours.
    pub fn production() -> Self {
        Self::from_secs(&[60, 300, 1800, 7200])
    }

    /// 5, 10, 15 and 20 seconds.
    pub fn test() -> Self {
        Self::from_secs(&[5, 10, 15, 20])
    }

    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Parse a comma separated list of seconds such as `"5,10,15,20"`.
    ///
    /// Returns `None` when any entry is not a non-negative integer or when
    /// fewer delays than retries are given.
    pub fn parse_secs(value: &str) -> Option<Self> {
        let delays = value
            .split(',')
            .map(|part| part.trim().parse::<u64>().ok().map(Duration::from_secs))
            .collect::<Option<Vec<_>>>()?;

        if delays.len() < (MAX_ATTEMPTS - 1) as usize {
            return None;
        }
        Some(Self::new(delays))
    }

    /// Delay before the next attempt, given the attempts made so far.
    ///
    /// `None` once the attempts budget is spent.
    pub fn delay_after(&self, attempts: i32) -> Option<Duration> {
        if attempts < 1 || attempts >= MAX_ATTEMPTS {
            return None;
        }
        self.delays.get((attempts - 1) as usize).copied()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::production()
    }
}
