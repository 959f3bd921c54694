use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlDatabaseError;

use super::{
    AttendanceFilter, AttendanceStore, EmployeeDirectory, HolidayCalendar, LeaveFilter,
    LeaveStore, Page,
};
use crate::error::StoreError;
use crate::model::{
    attendance::{
        AttendanceRecord, AttendanceRow, FinalStatus, NewCheckIn, SessionClose, SessionStatus,
    },
    employee::EmployeeProfile,
    holiday::Holiday,
    leave_request::{
        LeaveApplication, LeaveRow, LeaveStatus, LeaveTransition, LeaveType, NewLeave,
    },
};

/// MySQL `ER_DUP_ENTRY`.
const ER_DUP_ENTRY: u16 = 1062;

const ATTENDANCE_COLUMNS: &str = "id, employee_id, day, check_in_at, check_out_at, \
     session_status, final_status, worked_minutes, check_in_evidence_url, \
     check_out_evidence_url, check_in_location, check_out_location, check_in_source, \
     check_out_source";

const LEAVE_COLUMNS: &str = "id, employee_id, leave_type, from_date, to_date, total_days, \
     status, is_half_day, half_day_session, reason, reviewed_by, reviewed_at, decision_note, \
     created_at";

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn is_duplicate_entry(error_number: u16) -> bool {
    error_number == ER_DUP_ENTRY
}

/// Maps a write failure; a `(employee_id, day)` collision becomes
/// `StoreError::Duplicate` so the caller can report a conflict.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        let dup_number = db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|my| is_duplicate_entry(my.number()));
        if dup_number || db_err.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(e)
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(&'static str),
    Date(NaiveDate),
}

fn attendance_where(filter: &AttendanceFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(emp_id) = filter.employee_id {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::U64(emp_id));
    }
    if let Some(from) = filter.from {
        where_sql.push_str(" AND day >= ?");
        args.push(FilterValue::Date(from));
    }
    if let Some(to) = filter.to {
        where_sql.push_str(" AND day <= ?");
        args.push(FilterValue::Date(to));
    }
    if let Some(status) = filter.final_status {
        where_sql.push_str(" AND final_status = ?");
        args.push(FilterValue::Str(status.as_str()));
    }

    (where_sql, args)
}

fn leave_where(filter: &LeaveFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(emp_id) = filter.employee_id {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::U64(emp_id));
    }
    if let Some(status) = filter.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.as_str()));
    }
    if let Some(leave_type) = filter.leave_type {
        where_sql.push_str(" AND leave_type = ?");
        args.push(FilterValue::Str(leave_type.as_str()));
    }
    if let Some(from) = filter.from {
        where_sql.push_str(" AND to_date >= ?");
        args.push(FilterValue::Date(from));
    }
    if let Some(to) = filter.to {
        where_sql.push_str(" AND from_date <= ?");
        args.push(FilterValue::Date(to));
    }

    (where_sql, args)
}

macro_rules! bind_filters {
    ($query:expr, $args:expr) => {{
        let mut q = $query;
        for arg in $args {
            q = match arg {
                FilterValue::U64(v) => q.bind(*v),
                FilterValue::Str(s) => q.bind(*s),
                FilterValue::Date(d) => q.bind(*d),
            };
        }
        q
    }};
}

impl MySqlStore {
    async fn attendance_by_id(&self, id: u64) -> Result<AttendanceRecord, StoreError> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn leave_by_id(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError> {
        let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_applications WHERE id = ?");
        sqlx::query_as::<_, LeaveRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(LeaveApplication::try_from)
            .transpose()
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find_by_day(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql =
            format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_id = ? AND day = ?");
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee_id)
            .bind(day)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn insert_check_in(&self, new: &NewCheckIn) -> Result<AttendanceRecord, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, day, check_in_at, session_status, final_status, worked_minutes,
                 check_in_evidence_url, check_in_location, check_in_source)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.day)
        .bind(new.check_in_at)
        .bind(SessionStatus::Active.as_str())
        .bind(FinalStatus::Absent.as_str())
        .bind(&new.evidence_url)
        .bind(&new.location)
        .bind(&new.source)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        self.attendance_by_id(result.last_insert_id()).await
    }

    async fn close_session(&self, id: u64, close: &SessionClose) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET check_out_at = ?,
                worked_minutes = ?,
                final_status = ?,
                session_status = ?,
                check_out_evidence_url = ?,
                check_out_location = ?,
                check_out_source = ?
            WHERE id = ?
            AND check_out_at IS NULL
            "#,
        )
        .bind(close.check_out_at)
        .bind(close.worked_minutes)
        .bind(close.final_status.as_str())
        .bind(close.session_status.as_str())
        .bind(&close.evidence_url)
        .bind(&close.location)
        .bind(&close.source)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn attach_check_out_evidence(&self, id: u64, url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET check_out_evidence_url = ?
            WHERE id = ?
            AND check_out_at IS NOT NULL
            AND check_out_evidence_url IS NULL
            "#,
        )
        .bind(url)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_open_sessions(
        &self,
        up_to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE day <= ? AND check_in_at IS NOT NULL AND check_out_at IS NULL \
             ORDER BY day, id"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(up_to)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect()
    }

    async fn list(&self, filter: &AttendanceFilter) -> Result<Page<AttendanceRecord>, StoreError> {
        let (where_sql, args) = attendance_where(filter);

        let count_sql = format!("SELECT COUNT(*) FROM attendance{}", where_sql);
        let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &args)
            .fetch_one(&self.pool)
            .await?;

        let data_sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance{} ORDER BY day DESC, id DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let rows = bind_filters!(sqlx::query_as::<_, AttendanceRow>(&data_sql), &args)
            .bind(filter.pagination.per_page)
            .bind(filter.pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            data: rows
                .into_iter()
                .map(AttendanceRecord::try_from)
                .collect::<Result<_, _>>()?,
            page: filter.pagination.page,
            per_page: filter.pagination.per_page,
            total,
        })
    }
}

#[async_trait]
impl LeaveStore for MySqlStore {
    async fn insert(&self, new: &NewLeave) -> Result<LeaveApplication, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO leave_applications
                (employee_id, leave_type, from_date, to_date, total_days, status,
                 is_half_day, half_day_session, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.leave_type.as_str())
        .bind(new.from_date)
        .bind(new.to_date)
        .bind(new.total_days)
        .bind(LeaveStatus::Pending.as_str())
        .bind(new.is_half_day)
        .bind(new.half_day_session.map(|s| s.as_str()))
        .bind(&new.reason)
        .bind(new.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        self.leave_by_id(result.last_insert_id())
            .await?
            .ok_or_else(|| StoreError::Corrupt("inserted leave application vanished".into()))
    }

    async fn get(&self, id: u64) -> Result<Option<LeaveApplication>, StoreError> {
        self.leave_by_id(id).await
    }

    async fn find_overlapping(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LeaveApplication>, StoreError> {
        let sql = format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_applications \
             WHERE employee_id = ? \
             AND status IN ('pending', 'approved') \
             AND from_date <= ? AND to_date >= ?"
        );
        sqlx::query_as::<_, LeaveRow>(&sql)
            .bind(employee_id)
            .bind(to)
            .bind(from)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LeaveApplication::try_from)
            .collect()
    }

    async fn approved_days_by_type(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<LeaveType, f64>, StoreError> {
        let rows = sqlx::query_as::<_, (String, f64)>(
            r#"
            SELECT leave_type, SUM(total_days)
            FROM leave_applications
            WHERE employee_id = ?
            AND status = 'approved'
            AND from_date BETWEEN ? AND ?
            GROUP BY leave_type
            "#,
        )
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(leave_type, used)| {
                leave_type
                    .parse::<LeaveType>()
                    .map(|t| (t, used))
                    .map_err(|_| StoreError::Corrupt(format!("leave_type '{}'", leave_type)))
            })
            .collect()
    }

    async fn transition(&self, id: u64, change: &LeaveTransition) -> Result<bool, StoreError> {
        if change.from.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; change.from.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE leave_applications
            SET status = ?,
                reviewed_by = COALESCE(?, reviewed_by),
                reviewed_at = COALESCE(?, reviewed_at),
                decision_note = COALESCE(?, decision_note)
            WHERE id = ?
            AND status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(change.to.as_str())
            .bind(change.reviewed_by)
            .bind(change.reviewed_at)
            .bind(&change.decision_note)
            .bind(id);
        for status in &change.from {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn approved_covering(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<LeaveApplication>, StoreError> {
        let sql = format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_applications \
             WHERE employee_id = ? AND status = 'approved' \
             AND from_date <= ? AND to_date >= ? \
             ORDER BY is_half_day ASC LIMIT 1"
        );
        sqlx::query_as::<_, LeaveRow>(&sql)
            .bind(employee_id)
            .bind(day)
            .bind(day)
            .fetch_optional(&self.pool)
            .await?
            .map(LeaveApplication::try_from)
            .transpose()
    }

    async fn list(&self, filter: &LeaveFilter) -> Result<Page<LeaveApplication>, StoreError> {
        let (where_sql, args) = leave_where(filter);

        let count_sql = format!("SELECT COUNT(*) FROM leave_applications{}", where_sql);
        let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &args)
            .fetch_one(&self.pool)
            .await?;

        let data_sql = format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_applications{} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let rows = bind_filters!(sqlx::query_as::<_, LeaveRow>(&data_sql), &args)
            .bind(filter.pagination.per_page)
            .bind(filter.pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            data: rows
                .into_iter()
                .map(LeaveApplication::try_from)
                .collect::<Result<_, _>>()?,
            page: filter.pagination.page,
            per_page: filter.pagination.per_page,
            total,
        })
    }
}

#[async_trait]
impl HolidayCalendar for MySqlStore {
    async fn is_holiday(
        &self,
        date: NaiveDate,
        employee_id: u64,
    ) -> Result<Option<Holiday>, StoreError> {
        let holiday = sqlx::query_as::<_, Holiday>(
            r#"
            SELECT h.id, h.name, h.date, h.department_id
            FROM holidays h
            LEFT JOIN employees e ON e.id = ?
            WHERE h.date = ?
            AND (h.department_id IS NULL OR h.department_id = e.department_id)
            ORDER BY h.department_id IS NULL
            LIMIT 1
            "#,
        )
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(holiday)
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlStore {
    async fn resolve(&self, principal_id: u64) -> Result<Option<u64>, StoreError> {
        let employee_id = sqlx::query_scalar::<_, Option<u64>>(
            "SELECT employee_id FROM users WHERE id = ?",
        )
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(employee_id.flatten())
    }

    async fn profile(&self, employee_id: u64) -> Result<Option<EmployeeProfile>, StoreError> {
        let profile = sqlx::query_as::<_, EmployeeProfile>(
            r#"
            SELECT id, employee_code, first_name, last_name, department_id, status
            FROM employees
            WHERE id = ?
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }
}
