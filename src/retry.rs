use crate::error::{ConfigError, ConfigResult};
use crate::timing::Duration;

/// How often to poll, when to escalate, and when to give up.
///
/// Attempts are numbered from 1. Escalation applies from `soft_limit`
/// onwards; the loop is abandoned after attempt `hard_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RetryBudget {
    poll_interval: Duration,
    soft_limit: u32,
    hard_limit: u32,
}

impl RetryBudget {
    pub fn new(poll_interval: Duration, soft_limit: u32, hard_limit: u32) -> ConfigResult<Self> {
        if soft_limit == 0 || soft_limit >= hard_limit {
            return Err(ConfigError::InvalidLimits {
                soft_limit,
                hard_limit,
            });
        }
        Ok(Self {
            poll_interval,
            soft_limit,
            hard_limit,
        })
    }

    /// Derives the limits from how long to wait before escalating and before
    /// giving up, so that changing the poll interval keeps the timeouts.
    pub fn from_durations(
        poll_interval: Duration,
        escalate_after: Duration,
        give_up_after: Duration,
    ) -> ConfigResult<Self> {
        if poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        let intervals = |waited: Duration| {
            waited
                .intervals_of(poll_interval)
                .ok_or(ConfigError::WaitTooLong {
                    waited,
                    poll_interval,
                })
        };
        Self::new(
            poll_interval,
            intervals(escalate_after)?.max(1),
            intervals(give_up_after)?,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn soft_limit(&self) -> u32 {
        self.soft_limit
    }

    pub fn hard_limit(&self) -> u32 {
        self.hard_limit
    }

    /// The longest a loop under this budget will spend sleeping.
    pub fn max_wait(&self) -> Duration {
        self.poll_interval.times(self.hard_limit - 1)
    }

    pub fn attempts(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.hard_limit
    }

    pub fn is_escalating(&self, attempt: u32) -> bool {
        attempt >= self.soft_limit
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.hard_limit
    }

    pub fn pause(&self) {
        self.poll_interval.sleep()
    }
}
