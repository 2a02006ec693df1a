#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize, serde::Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Duration(std::time::Duration);

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // we use the debug format of the inner duration, which is good enough
        write!(f, "{:?}", self.0)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self(value)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl From<Duration> for String {
    fn from(value: Duration) -> Self {
        let millis = value.0.as_millis();
        if millis % 1000 != 0 {
            format!("{}ms", millis)
        } else {
            format!("{}s", millis / 1000)
        }
    }
}

impl TryFrom<String> for Duration {
    type Error = DurationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parses durations such as `500ms`, `5s`, `10m`, `1h`, or compounds like
/// `10m30s`. A bare number is taken as seconds.
impl std::str::FromStr for Duration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(DurationParseError(s.to_owned()));
        }
        let invalid = || DurationParseError(s.to_owned());
        if let Ok(seconds) = input.parse::<u64>() {
            return Self::checked_of(seconds, DurationUnit::Seconds).ok_or_else(invalid);
        }

        let mut total = std::time::Duration::ZERO;
        let mut rest = input;
        while !rest.is_empty() {
            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits == 0 {
                return Err(invalid());
            }
            let magnitude: u64 = rest[..digits].parse().map_err(|_| invalid())?;
            rest = &rest[digits..];
            let unit_length = rest
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(rest.len());
            let unit = match &rest[..unit_length] {
                "ms" => DurationUnit::Milliseconds,
                "s" => DurationUnit::Seconds,
                "m" => DurationUnit::Minutes,
                "h" => DurationUnit::Hours,
                _ => return Err(invalid()),
            };
            rest = &rest[unit_length..];
            total = Self::checked_of(magnitude, unit)
                .and_then(|part| total.checked_add(part.0))
                .ok_or_else(invalid)?;
        }
        Ok(Self(total))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration {0:?}; expected something like \"500ms\", \"5s\", or \"10m30s\"")]
pub struct DurationParseError(String);

impl Duration {
    pub const ZERO: Self = Self(std::time::Duration::ZERO);

    pub const QUANTUM: Self = Self::of(100, DurationUnit::Milliseconds);

    pub const fn of(magnitude: u64, unit: DurationUnit) -> Self {
        Self(match unit {
            DurationUnit::Milliseconds => std::time::Duration::from_millis(magnitude),
            DurationUnit::Seconds => std::time::Duration::from_secs(magnitude),
            DurationUnit::Minutes => std::time::Duration::from_secs(magnitude * 60),
            DurationUnit::Hours => std::time::Duration::from_secs(magnitude * 60 * 60),
        })
    }

    /// Like `of`, but `None` where the magnitude overflows.
    pub fn checked_of(magnitude: u64, unit: DurationUnit) -> Option<Self> {
        let seconds = match unit {
            DurationUnit::Milliseconds => return Some(Self::of(magnitude, unit)),
            DurationUnit::Seconds => magnitude,
            DurationUnit::Minutes => magnitude.checked_mul(60)?,
            DurationUnit::Hours => magnitude.checked_mul(60 * 60)?,
        };
        Some(Self::of(seconds, DurationUnit::Seconds))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// How many whole intervals it takes to cover this duration, rounding up.
    pub fn intervals_of(&self, interval: Duration) -> Option<u32> {
        let interval = interval.0.as_nanos();
        if interval == 0 {
            return None;
        }
        let count = (self.0.as_nanos() + interval - 1) / interval;
        u32::try_from(count).ok()
    }

    pub fn times(&self, count: u32) -> Self {
        Self(self.0.saturating_mul(count))
    }

    pub fn sleep(&self) {
        if !self.is_zero() {
            std::thread::sleep((*self).into())
        }
    }
}

pub enum DurationUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_simple_durations() -> anyhow::Result<()> {
        assert_eq!(
            "500ms".parse::<Duration>()?,
            Duration::of(500, DurationUnit::Milliseconds)
        );
        assert_eq!(
            "5s".parse::<Duration>()?,
            Duration::of(5, DurationUnit::Seconds)
        );
        assert_eq!(
            "10m".parse::<Duration>()?,
            Duration::of(10, DurationUnit::Minutes)
        );
        assert_eq!(
            "42".parse::<Duration>()?,
            Duration::of(42, DurationUnit::Seconds)
        );
        Ok(())
    }

    #[test]
    fn test_parsing_compound_durations() -> anyhow::Result<()> {
        assert_eq!(
            "10m30s".parse::<Duration>()?,
            Duration::of(630, DurationUnit::Seconds)
        );
        assert_eq!(
            "1h1ms".parse::<Duration>()?,
            Duration::from(std::time::Duration::from_millis(3_600_001))
        );
        Ok(())
    }

    #[test]
    fn test_rejecting_nonsense() {
        for input in ["", "s", "5x", "5 s", "-5s", "m10"] {
            assert!(
                input.parse::<Duration>().is_err(),
                "expected {:?} to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_rejecting_durations_that_overflow() {
        for input in [
            "307445734561825861m",
            "5124095576030432h",
            "18446744073709551615s18446744073709551615s",
        ] {
            assert!(
                matches!(input.parse::<Duration>(), Err(DurationParseError(_))),
                "expected {:?} to be rejected",
                input
            );
        }
        assert_eq!(
            Duration::checked_of(u64::MAX, DurationUnit::Seconds),
            Some(Duration::from(std::time::Duration::from_secs(u64::MAX)))
        );
    }

    #[test]
    fn test_counting_intervals_rounds_up() {
        let interval = Duration::of(5, DurationUnit::Seconds);
        assert_eq!(Duration::of(100, DurationUnit::Seconds).intervals_of(interval), Some(20));
        assert_eq!(Duration::of(101, DurationUnit::Seconds).intervals_of(interval), Some(21));
        assert_eq!(Duration::ZERO.intervals_of(interval), Some(0));
        assert_eq!(Duration::QUANTUM.intervals_of(Duration::ZERO), None);
    }

    #[test]
    fn test_serializing_as_a_string() -> anyhow::Result<()> {
        let duration = Duration::of(90, DurationUnit::Seconds);
        assert_eq!(serde_json::to_string(&duration)?, "\"90s\"");
        assert_eq!(serde_json::to_string(&Duration::QUANTUM)?, "\"100ms\"");

        let deserialized: Duration = serde_json::from_str("\"1m30s\"")?;
        assert_eq!(deserialized, duration);
        Ok(())
    }
}
