use std::collections::BTreeMap;

use anyhow::{Result, ensure};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::model::attendance::{FinalStatus, SessionStatus};
use crate::model::leave_request::LeaveType;

/// Office window, presence threshold and weekly rest days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficePolicy {
    office_start: NaiveTime,
    office_end: NaiveTime,
    min_present_minutes: i64,
    weekend: Vec<Weekday>,
}

/// Outcome of closing a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closing {
    pub check_out_at: NaiveDateTime,
    pub worked_minutes: i64,
    pub final_status: FinalStatus,
    pub session_status: SessionStatus,
}

impl OfficePolicy {
    pub fn new(
        office_start: NaiveTime,
        office_end: NaiveTime,
        min_present_minutes: i64,
        weekend: Vec<Weekday>,
    ) -> Result<Self> {
        ensure!(
            office_end > office_start,
            "OFFICE_END ({office_end}) must be after OFFICE_START ({office_start})"
        );
        ensure!(
            min_present_minutes >= 0,
            "MIN_PRESENT_MINUTES must not be negative"
        );
        Ok(Self {
            office_start,
            office_end,
            min_present_minutes,
            weekend,
        })
    }

    pub fn office_start(&self) -> NaiveTime {
        self.office_start
    }

    pub fn office_end(&self) -> NaiveTime {
        self.office_end
    }

    pub fn min_present_minutes(&self) -> i64 {
        self.min_present_minutes
    }

    /// Half-way point of the office window; the latest allowed check-in.
    pub fn midpoint(&self) -> NaiveTime {
        self.office_start + (self.office_end - self.office_start) / 2
    }

    pub fn is_weekend(&self, day: NaiveDate) -> bool {
        self.weekend.contains(&day.weekday())
    }

    pub fn office_end_on(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.office_end)
    }

    pub fn check_in_cutoff_on(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.midpoint())
    }

    /// Closes a session opened at `check_in_at` as of `now`.
    ///
    /// The checkout is clamped to the office end of the session's own day, so
    /// a forgotten session from an earlier day is still closed at that day's
    /// office end.
    pub fn close(&self, check_in_at: NaiveDateTime, now: NaiveDateTime) -> Closing {
        let office_end = self.office_end_on(check_in_at.date());
        let check_out_at = now.min(office_end);
        let worked_minutes = (check_out_at - check_in_at).num_minutes().max(0);

        Closing {
            check_out_at,
            worked_minutes,
            final_status: if worked_minutes >= self.min_present_minutes {
                FinalStatus::Present
            } else {
                FinalStatus::Absent
            },
            session_status: if now <= office_end {
                SessionStatus::Completed
            } else {
                SessionStatus::AutoStopped
            },
        }
    }
}

impl Default for OfficePolicy {
    fn default() -> Self {
        Self {
            office_start: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            office_end: NaiveTime::from_hms_opt(18, 30, 0).unwrap_or(NaiveTime::MIN),
            min_present_minutes: 270,
            weekend: vec![Weekday::Sat, Weekday::Sun],
        }
    }
}

/// Yearly allocation per leave type. Types without an entry are unlimited.
#[derive(Debug, Clone, PartialEq)]
pub struct LeavePolicy {
    allocations: BTreeMap<LeaveType, f64>,
}

impl LeavePolicy {
    pub fn with_allocation(mut self, leave_type: LeaveType, days: f64) -> Self {
        if !leave_type.is_unlimited() {
            self.allocations.insert(leave_type, days);
        }
        self
    }

    pub fn allocation(&self, leave_type: LeaveType) -> Option<f64> {
        self.allocations.get(&leave_type).copied()
    }
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            allocations: BTreeMap::from([
                (LeaveType::Annual, 15.0),
                (LeaveType::Casual, 12.0),
                (LeaveType::Sick, 14.0),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 11)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn midpoint_of_default_window_is_two_pm() {
        let policy = OfficePolicy::default();
        assert_eq!(policy.midpoint(), NaiveTime::from_hms_opt(14, 0, 0).unwrap());
        assert_eq!(policy.check_in_cutoff_on(at(0, 0).date()), at(14, 0));
    }

    #[test]
    fn presence_threshold_is_inclusive() {
        let policy = OfficePolicy::default();

        let closing = policy.close(at(9, 30), at(14, 0));
        assert_eq!(closing.worked_minutes, 270);
        assert_eq!(closing.final_status, FinalStatus::Present);
        assert_eq!(closing.session_status, SessionStatus::Completed);

        let closing = policy.close(at(9, 30), at(13, 30));
        assert_eq!(closing.worked_minutes, 240);
        assert_eq!(closing.final_status, FinalStatus::Absent);
    }

    #[test]
    fn checkout_after_office_end_is_clamped_and_auto_stopped() {
        let policy = OfficePolicy::default();
        let closing = policy.close(at(10, 0), at(21, 15));
        assert_eq!(closing.check_out_at, at(18, 30));
        assert_eq!(closing.worked_minutes, 510);
        assert_eq!(closing.session_status, SessionStatus::AutoStopped);
    }

    #[test]
    fn forgotten_session_closes_at_its_own_office_end() {
        let policy = OfficePolicy::default();
        let next_morning = at(8, 0) + chrono::Duration::days(1);
        let closing = policy.close(at(9, 45), next_morning);
        assert_eq!(closing.check_out_at, at(18, 30));
        assert_eq!(closing.session_status, SessionStatus::AutoStopped);
    }

    #[test]
    fn worked_minutes_never_negative() {
        let policy = OfficePolicy::default();
        assert_eq!(policy.close(at(11, 0), at(10, 0)).worked_minutes, 0);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(OfficePolicy::new(nine, nine, 270, vec![]).is_err());
    }

    #[test]
    fn unpaid_leave_has_no_allocation() {
        let policy = LeavePolicy::default().with_allocation(LeaveType::Unpaid, 3.0);
        assert_eq!(policy.allocation(LeaveType::Unpaid), None);
        assert_eq!(policy.allocation(LeaveType::Casual), Some(12.0));
    }
}
