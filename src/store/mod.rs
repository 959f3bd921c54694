//! Storage seams for attendance records, leave applications and the
//! collaborator lookups (holiday calendar, employee directory).
//!
//! `mysql` is the production backend; `memory` backs development mode and
//! the test suites. Both enforce the `(employee_id, day)` uniqueness rule and
//! report a collision as [`StoreError::Duplicate`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::model::{
    attendance::{AttendanceRecord, FinalStatus, NewCheckIn, SessionClose},
    employee::EmployeeProfile,
    holiday::Holiday,
    leave_request::{LeaveApplication, LeaveStatus, LeaveTransition, LeaveType, NewLeave},
};

pub mod memory;
pub mod mysql;

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_by_day(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Creates the day's record. A second record for the same
    /// `(employee_id, day)` fails with `StoreError::Duplicate`.
    async fn insert_check_in(&self, new: &NewCheckIn) -> Result<AttendanceRecord, StoreError>;

    /// Applies `close` only while the session is still open.
    /// Returns `false` when another writer closed it first.
    async fn close_session(&self, id: u64, close: &SessionClose) -> Result<bool, StoreError>;

    /// Sets the checkout evidence only if it is still missing.
    async fn attach_check_out_evidence(&self, id: u64, url: &str) -> Result<bool, StoreError>;

    /// Sessions checked in but never closed, for days up to and including `up_to`.
    async fn list_open_sessions(&self, up_to: NaiveDate)
    -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn list(&self, filter: &AttendanceFilter) -> Result<Page<AttendanceRecord>, StoreError>;
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    async fn insert(&self, new: &NewLeave) -> Result<LeaveApplication, StoreError>;

    async fn get(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError>;

    /// Pending or approved applications of `employee_id` intersecting `[from, to]`.
    async fn find_overlapping(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LeaveApplication>, StoreError>;

    /// Sum of approved `total_days` per type for applications whose
    /// `from_date` lies in `[from, to]`.
    async fn approved_days_by_type(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<LeaveType, f64>, StoreError>;

    /// Conditional status update; `false` when the current status is not in
    /// `change.from`.
    async fn transition(&self, id: u64, change: &LeaveTransition) -> Result<bool, StoreError>;

    async fn approved_covering(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<LeaveApplication>, StoreError>;

    async fn list(&self, filter: &LeaveFilter) -> Result<Page<LeaveApplication>, StoreError>;
}

#[async_trait]
pub trait HolidayCalendar: Send + Sync {
    async fn is_holiday(
        &self,
        date: NaiveDate,
        employee_id: u64,
    ) -> Result<Option<Holiday>, StoreError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// Maps an authenticated principal (user id) to its employee id.
    async fn resolve(&self, principal_id: u64) -> Result<Option<u64>, StoreError>;

    async fn profile(&self, employee_id: u64) -> Result<Option<EmployeeProfile>, StoreError>;
}

/// Normalised page request: `page` is 1-based, `per_page` defaults to 10 and
/// is capped at 100. Pages beyond `MAX_PAGE` are read as the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    pub const MAX_PAGE: u64 = u32::MAX as u64;

    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            per_page: per_page.unwrap_or(10).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub employee_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub final_status: Option<FinalStatus>,
    pub pagination: Pagination,
}

impl AttendanceFilter {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.employee_id.is_none_or(|id| record.employee_id == id)
            && self.from.is_none_or(|from| record.day >= from)
            && self.to.is_none_or(|to| record.day <= to)
            && self.final_status.is_none_or(|s| record.final_status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaveFilter {
    pub employee_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    pub leave_type: Option<LeaveType>,
    /// Applications intersecting `[from, to]`; either bound may be open.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub pagination: Pagination,
}

impl LeaveFilter {
    pub fn matches(&self, leave: &LeaveApplication) -> bool {
        self.employee_id.is_none_or(|id| leave.employee_id == id)
            && self.status.is_none_or(|s| leave.status == s)
            && self.leave_type.is_none_or(|t| leave.leave_type == t)
            && self.from.is_none_or(|from| leave.to_date >= from)
            && self.to.is_none_or(|to| leave.from_date <= to)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_caps() {
        let p = Pagination::new(None, None);
        assert_eq!((p.page, p.per_page, p.offset()), (1, 10, 0));

        let p = Pagination::new(Some(0), Some(500));
        assert_eq!((p.page, p.per_page), (1, 100));

        let p = Pagination::new(Some(3), Some(20));
        assert_eq!(p.offset(), 40);

        let p = Pagination::new(Some(u64::MAX), Some(100));
        assert_eq!(p.page, Pagination::MAX_PAGE);
        assert_eq!(p.offset(), (Pagination::MAX_PAGE - 1) * 100);
    }
}
