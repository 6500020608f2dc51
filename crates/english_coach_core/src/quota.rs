//! crates/english_coach_core/src/quota.rs
//!
//! The per-user daily quota on AI-consuming requests.
//!
//! The counter resets lazily: the first check on a new calendar day (UTC)
//! zeroes it. Checks never increment; the caller charges usage only after a
//! generation succeeded, so failed calls are free.

use crate::domain::Usage;
use chrono::{DateTime, Utc};

/// Default number of AI requests a user may make per day.
pub const DEFAULT_DAILY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuotaDecision {
    /// The request may proceed. `reset` is set when the stored counter is stale
    /// and must be persisted as `usage` before continuing.
    Allow { usage: Usage, reset: bool },
    /// The user has used up today's allowance.
    Reject { usage: Usage, limit: u32 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allow { .. })
    }
}

/// Whether two instants fall on the same UTC calendar day.
pub fn same_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

/// Evaluates a user's usage against the daily limit at `now`.
pub fn check_quota(usage: Usage, now: DateTime<Utc>, limit: u32) -> QuotaDecision {
    let (usage, reset) = if same_day(usage.date, now) {
        (usage, false)
    } else {
        (Usage { count: 0, date: now }, true)
    };

    if usage.count >= limit {
        QuotaDecision::Reject { usage, limit }
    } else {
        QuotaDecision::Allow { usage, reset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn stale_counter_resets_regardless_of_value() {
        for days_ago in [1, 2, 30, 365] {
            let usage = Usage { count: 5_000, date: noon() - Duration::days(days_ago) };
            match check_quota(usage, noon(), DEFAULT_DAILY_LIMIT) {
                QuotaDecision::Allow { usage, reset } => {
                    assert!(reset);
                    assert_eq!(usage.count, 0);
                    assert_eq!(usage.date, noon());
                }
                other => panic!("expected reset, got {:?}", other),
            }
        }
    }

    #[test]
    fn same_day_last_year_is_still_stale() {
        let usage = Usage { count: 100, date: noon() - Duration::days(365) };
        assert!(check_quota(usage, noon(), 100).is_allowed());
    }

    #[test]
    fn boundary_allows_below_limit_and_rejects_at_limit() {
        let below = Usage { count: DEFAULT_DAILY_LIMIT - 1, date: noon() };
        assert_eq!(
            check_quota(below, noon(), DEFAULT_DAILY_LIMIT),
            QuotaDecision::Allow { usage: below, reset: false }
        );

        let at = Usage { count: DEFAULT_DAILY_LIMIT, date: noon() };
        assert!(matches!(
            check_quota(at, noon(), DEFAULT_DAILY_LIMIT),
            QuotaDecision::Reject { limit: DEFAULT_DAILY_LIMIT, .. }
        ));
    }

    #[test]
    fn midnight_rollover_counts_as_a_new_day() {
        let late = Utc.with_ymd_and_hms(2024, 3, 14, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 15, 0, 1, 0).unwrap();
        assert!(!same_day(late, early));
    }
}
