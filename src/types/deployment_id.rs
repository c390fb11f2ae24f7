// ABOUTME: Timestamp identifiers for deployments and release directories.
// ABOUTME: Second resolution, lexicographically sortable in chronological order.

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// `YYYY-MM-DD-HH-mm-ss`. Zero padded, so string order equals time order.
pub const DEPLOYMENT_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

#[derive(Debug, Error)]
#[error("invalid deployment id '{0}': expected YYYY-MM-DD-HH-mm-ss")]
pub struct DeploymentIdError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeploymentId(NaiveDateTime);

impl DeploymentId {
    pub fn new(at: NaiveDateTime) -> Self {
        // Sub-second precision would break the round trip through the name.
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    /// Identifier for the current local time.
    pub fn now() -> Self {
        Self::new(Local::now().naive_local())
    }

    pub fn parse(value: &str) -> Result<Self, DeploymentIdError> {
        NaiveDateTime::parse_from_str(value, DEPLOYMENT_ID_FORMAT)
            .map(Self)
            .map_err(|_| DeploymentIdError(value.to_string()))
    }

    /// The identifier one second later.
    pub fn next(&self) -> Self {
        Self(self.0 + Duration::seconds(1))
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DEPLOYMENT_ID_FORMAT))
    }
}

impl FromStr for DeploymentId {
    type Err = DeploymentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Hands out strictly increasing identifiers.
///
/// Two triggers landing in the same second would otherwise share a log file
/// and a release directory, so a clashing id is pushed forward a second.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: Mutex<Option<DeploymentId>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> DeploymentId {
        self.next_at(DeploymentId::now())
    }

    /// Allocate relative to an explicit clock reading.
    pub fn next_at(&self, now: DeploymentId) -> DeploymentId {
        let mut last = self.last.lock();
        let id = match *last {
            Some(previous) if now <= previous => previous.next(),
            _ => now,
        };
        *last = Some(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> DeploymentId {
        DeploymentId::new(
            NaiveDate::from_ymd_opt(2024, 3, 9)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
        )
    }

    #[test]
    fn formats_as_sortable_timestamp() {
        assert_eq!(at(7, 5, 3).to_string(), "2024-03-09-07-05-03");
    }

    #[test]
    fn parses_its_own_format() {
        let id = at(23, 59, 59);
        assert_eq!(DeploymentId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn rejects_foreign_names() {
        assert!(DeploymentId::parse("../../etc/passwd").is_err());
        assert!(DeploymentId::parse("2024-03-09").is_err());
    }

    #[test]
    fn string_order_matches_time_order() {
        let ids = [at(9, 0, 0), at(10, 0, 0), at(9, 59, 59)];
        let mut by_name: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        by_name.sort();
        let mut by_time = ids.to_vec();
        by_time.sort();
        let by_time: Vec<String> = by_time.iter().map(|i| i.to_string()).collect();
        assert_eq!(by_name, by_time);
    }

    #[test]
    fn allocator_never_repeats_within_a_second() {
        let ids = IdAllocator::new();
        let now = at(12, 0, 0);
        let first = ids.next_at(now);
        let second = ids.next_at(now);
        let third = ids.next_at(now);
        assert_eq!(first, now);
        assert_eq!(second, at(12, 0, 1));
        assert_eq!(third, at(12, 0, 2));
    }

    #[test]
    fn allocator_follows_clock_when_it_moves_ahead() {
        let ids = IdAllocator::new();
        ids.next_at(at(12, 0, 0));
        assert_eq!(ids.next_at(at(12, 5, 0)), at(12, 5, 0));
    }
}
