use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    AttendanceFilter, AttendanceStore, EmployeeDirectory, HolidayCalendar, LeaveFilter,
    LeaveStore, Page, Pagination,
};
use crate::error::StoreError;
use crate::model::{
    attendance::{AttendanceRecord, FinalStatus, NewCheckIn, SessionClose, SessionStatus},
    employee::EmployeeProfile,
    holiday::Holiday,
    leave_request::{LeaveApplication, LeaveStatus, LeaveTransition, LeaveType, NewLeave},
};

#[derive(Default)]
struct Tables {
    /// Keyed by `(employee_id, day)`; the key is the uniqueness constraint.
    attendance: BTreeMap<(u64, NaiveDate), AttendanceRecord>,
    leaves: BTreeMap<u64, LeaveApplication>,
    holidays: Vec<Holiday>,
    /// user id -> employee id
    principals: HashMap<u64, u64>,
    employees: HashMap<u64, EmployeeProfile>,
}

/// Process-local backend implementing every storage seam.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two employees (user 1 -> employee 1000, user 2 -> employee 1001) so the
    /// service is usable without a database.
    pub fn seeded_for_development() -> Self {
        let store = Self::new();
        store.add_employee(
            1,
            EmployeeProfile {
                id: 1000,
                employee_code: "EMP-1000".into(),
                first_name: "Demo".into(),
                last_name: "Employee".into(),
                department_id: 10,
                status: "active".into(),
            },
        );
        store.add_employee(
            2,
            EmployeeProfile {
                id: 1001,
                employee_code: "EMP-1001".into(),
                first_name: "Demo".into(),
                last_name: "Reviewer".into(),
                department_id: 20,
                status: "active".into(),
            },
        );
        store
    }

    pub fn add_employee(&self, user_id: u64, profile: EmployeeProfile) {
        let mut tables = self.write();
        tables.principals.insert(user_id, profile.id);
        tables.employees.insert(profile.id, profile);
    }

    pub fn add_holiday(&self, holiday: Holiday) {
        self.write().holidays.push(holiday);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn paginate<T>(rows: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = rows.len() as i64;
    let data = rows
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.per_page as usize)
        .collect();
    Page {
        data,
        page: pagination.page,
        per_page: pagination.per_page,
        total,
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_by_day(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.read().attendance.get(&(employee_id, day)).cloned())
    }

    async fn insert_check_in(&self, new: &NewCheckIn) -> Result<AttendanceRecord, StoreError> {
        let mut tables = self.write();
        let key = (new.employee_id, new.day);
        if tables.attendance.contains_key(&key) {
            return Err(StoreError::Duplicate);
        }

        let record = AttendanceRecord {
            id: self.next_id(),
            employee_id: new.employee_id,
            day: new.day,
            check_in_at: Some(new.check_in_at),
            check_out_at: None,
            session_status: SessionStatus::Active,
            final_status: FinalStatus::Absent,
            worked_minutes: 0,
            check_in_evidence_url: Some(new.evidence_url.clone()),
            check_out_evidence_url: None,
            check_in_location: new.location.clone(),
            check_out_location: None,
            check_in_source: new.source.clone(),
            check_out_source: None,
        };
        tables.attendance.insert(key, record.clone());
        Ok(record)
    }

    async fn close_session(&self, id: u64, close: &SessionClose) -> Result<bool, StoreError> {
        let mut tables = self.write();
        let Some(record) = tables
            .attendance
            .values_mut()
            .find(|r| r.id == id && r.check_out_at.is_none())
        else {
            return Ok(false);
        };

        record.check_out_at = Some(close.check_out_at);
        record.worked_minutes = close.worked_minutes;
        record.final_status = close.final_status;
        record.session_status = close.session_status;
        record.check_out_evidence_url = close.evidence_url.clone();
        record.check_out_location = close.location.clone();
        record.check_out_source = close.source.clone();
        Ok(true)
    }

    async fn attach_check_out_evidence(&self, id: u64, url: &str) -> Result<bool, StoreError> {
        let mut tables = self.write();
        let Some(record) = tables
            .attendance
            .values_mut()
            .find(|r| r.id == id && r.check_out_at.is_some() && r.check_out_evidence_url.is_none())
        else {
            return Ok(false);
        };
        record.check_out_evidence_url = Some(url.to_string());
        Ok(true)
    }

    async fn list_open_sessions(
        &self,
        up_to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .read()
            .attendance
            .values()
            .filter(|r| r.day <= up_to && r.is_open())
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &AttendanceFilter) -> Result<Page<AttendanceRecord>, StoreError> {
        let mut rows: Vec<AttendanceRecord> = self
            .read()
            .attendance
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.day.cmp(&a.day).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, filter.pagination))
    }
}

#[async_trait]
impl LeaveStore for MemoryStore {
    async fn insert(&self, new: &NewLeave) -> Result<LeaveApplication, StoreError> {
        let leave = LeaveApplication {
            id: self.next_id(),
            employee_id: new.employee_id,
            leave_type: new.leave_type,
            from_date: new.from_date,
            to_date: new.to_date,
            total_days: new.total_days,
            status: LeaveStatus::Pending,
            is_half_day: new.is_half_day,
            half_day_session: new.half_day_session,
            reason: new.reason.clone(),
            reviewed_by: None,
            reviewed_at: None,
            decision_note: None,
            created_at: new.created_at,
        };
        self.write().leaves.insert(leave.id, leave.clone());
        Ok(leave)
    }

    async fn get(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError> {
        Ok(self.read().leaves.get(&id).cloned())
    }

    async fn find_overlapping(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LeaveApplication>, StoreError> {
        Ok(self
            .read()
            .leaves
            .values()
            .filter(|l| l.employee_id == employee_id && l.status.is_active() && l.overlaps(from, to))
            .cloned()
            .collect())
    }

    async fn approved_days_by_type(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<LeaveType, f64>, StoreError> {
        let mut used = HashMap::new();
        for leave in self.read().leaves.values().filter(|l| {
            l.employee_id == employee_id
                && l.status == LeaveStatus::Approved
                && l.from_date >= from
                && l.from_date <= to
        }) {
            *used.entry(leave.leave_type).or_insert(0.0) += leave.total_days;
        }
        Ok(used)
    }

    async fn transition(&self, id: u64, change: &LeaveTransition) -> Result<bool, StoreError> {
        let mut tables = self.write();
        let Some(leave) = tables.leaves.get_mut(&id) else {
            return Ok(false);
        };
        if !change.from.contains(&leave.status) {
            return Ok(false);
        }

        leave.status = change.to;
        if change.reviewed_by.is_some() {
            leave.reviewed_by = change.reviewed_by;
            leave.reviewed_at = change.reviewed_at;
            leave.decision_note = change.decision_note.clone();
        }
        Ok(true)
    }

    async fn approved_covering(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<LeaveApplication>, StoreError> {
        Ok(self
            .read()
            .leaves
            .values()
            .find(|l| {
                l.employee_id == employee_id && l.status == LeaveStatus::Approved && l.covers(day)
            })
            .cloned())
    }

    async fn list(&self, filter: &LeaveFilter) -> Result<Page<LeaveApplication>, StoreError> {
        let mut rows: Vec<LeaveApplication> = self
            .read()
            .leaves
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, filter.pagination))
    }
}

#[async_trait]
impl HolidayCalendar for MemoryStore {
    async fn is_holiday(
        &self,
        date: NaiveDate,
        employee_id: u64,
    ) -> Result<Option<Holiday>, StoreError> {
        let tables = self.read();
        let department = tables.employees.get(&employee_id).map(|e| e.department_id);
        Ok(tables
            .holidays
            .iter()
            .find(|h| h.date == date && h.applies_to(department))
            .cloned())
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryStore {
    async fn resolve(&self, principal_id: u64) -> Result<Option<u64>, StoreError> {
        Ok(self.read().principals.get(&principal_id).copied())
    }

    async fn profile(&self, employee_id: u64) -> Result<Option<EmployeeProfile>, StoreError> {
        Ok(self.read().employees.get(&employee_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    fn check_in(employee_id: u64) -> NewCheckIn {
        NewCheckIn {
            employee_id,
            day: day(),
            check_in_at: day().and_hms_opt(9, 30, 0).unwrap(),
            evidence_url: "mem://in".into(),
            location: None,
            source: None,
        }
    }

    #[actix_web::test]
    async fn second_record_for_same_day_is_duplicate() {
        let store = MemoryStore::new();
        store.insert_check_in(&check_in(1000)).await.unwrap();

        let err = store.insert_check_in(&check_in(1000)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));

        // another employee on the same day is fine
        store.insert_check_in(&check_in(1001)).await.unwrap();
    }

    #[actix_web::test]
    async fn close_session_applies_once() {
        let store = MemoryStore::new();
        let record = store.insert_check_in(&check_in(1000)).await.unwrap();
        let close = SessionClose {
            check_out_at: day().and_hms_opt(18, 30, 0).unwrap(),
            worked_minutes: 540,
            final_status: FinalStatus::Present,
            session_status: SessionStatus::AutoStopped,
            evidence_url: None,
            location: None,
            source: None,
        };

        assert!(store.close_session(record.id, &close).await.unwrap());
        assert!(!store.close_session(record.id, &close).await.unwrap());
        assert!(store.list_open_sessions(day()).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn check_out_evidence_attaches_only_to_closed_sessions() {
        let store = MemoryStore::new();
        let record = store.insert_check_in(&check_in(1000)).await.unwrap();

        // still open
        assert!(!store.attach_check_out_evidence(record.id, "mem://out").await.unwrap());

        let close = SessionClose {
            check_out_at: day().and_hms_opt(18, 30, 0).unwrap(),
            worked_minutes: 540,
            final_status: FinalStatus::Present,
            session_status: SessionStatus::AutoStopped,
            evidence_url: None,
            location: None,
            source: Some("auto-stop".into()),
        };
        assert!(store.close_session(record.id, &close).await.unwrap());
        assert!(store.attach_check_out_evidence(record.id, "mem://out").await.unwrap());
        assert!(!store.attach_check_out_evidence(record.id, "mem://again").await.unwrap());

        let stored = store.find_by_day(1000, day()).await.unwrap().unwrap();
        assert_eq!(stored.check_out_evidence_url.as_deref(), Some("mem://out"));
    }

    #[actix_web::test]
    async fn department_holiday_only_applies_to_that_department() {
        let store = MemoryStore::seeded_for_development();
        store.add_holiday(Holiday {
            id: 1,
            name: "Team offsite".into(),
            date: day(),
            department_id: Some(20),
        });

        assert!(store.is_holiday(day(), 1000).await.unwrap().is_none());
        assert!(store.is_holiday(day(), 1001).await.unwrap().is_some());
    }
}
