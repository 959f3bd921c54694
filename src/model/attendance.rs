use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::EnumString;
use utoipa::ToSchema;

use crate::error::StoreError;

/// Lifecycle of a day's attendance session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Completed,
    AutoStopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::AutoStopped => "auto_stopped",
        }
    }
}

/// Qualitative verdict for a day.
///
/// Stored records only ever carry `Present` or `Absent`; the other variants
/// are produced when a day is resolved without a record (see
/// `service::attendance::resolve_day_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinalStatus {
    Present,
    Absent,
    HalfDay,
    Leave,
    Holiday,
    Weekend,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Present => "present",
            FinalStatus::Absent => "absent",
            FinalStatus::HalfDay => "half_day",
            FinalStatus::Leave => "leave",
            FinalStatus::Holiday => "holiday",
            FinalStatus::Weekend => "weekend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "employee_id": 1000,
    "day": "2024-03-11",
    "check_in_at": "2024-03-11T09:30:00",
    "check_out_at": "2024-03-11T18:02:00",
    "session_status": "completed",
    "final_status": "present",
    "worked_minutes": 512,
    "check_in_evidence_url": "/evidence/attendance/1000/2024-03-11/check-in-1b4e.jpg",
    "check_out_evidence_url": "/evidence/attendance/1000/2024-03-11/check-out-77ac.jpg",
    "check_in_location": "23.7806,90.4070",
    "check_out_location": "23.7806,90.4070",
    "check_in_source": "mobile",
    "check_out_source": "mobile"
}))]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub day: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_at: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_at: Option<NaiveDateTime>,
    pub session_status: SessionStatus,
    pub final_status: FinalStatus,
    pub worked_minutes: i64,
    pub check_in_evidence_url: Option<String>,
    pub check_out_evidence_url: Option<String>,
    pub check_in_location: Option<String>,
    pub check_out_location: Option<String>,
    pub check_in_source: Option<String>,
    pub check_out_source: Option<String>,
}

impl AttendanceRecord {
    /// Checked in, not yet checked out (by the employee or by auto-stop).
    pub fn is_open(&self) -> bool {
        self.check_in_at.is_some() && self.check_out_at.is_none()
    }

    pub fn needs_check_out_evidence(&self) -> bool {
        self.check_out_at.is_some() && self.check_out_evidence_url.is_none()
    }
}

/// Values written when a record is created by a check-in.
#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub employee_id: u64,
    pub day: NaiveDate,
    pub check_in_at: NaiveDateTime,
    pub evidence_url: String,
    pub location: Option<String>,
    pub source: Option<String>,
}

/// Values written when an open session is closed, by a real checkout or a
/// synthesized one.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionClose {
    pub check_out_at: NaiveDateTime,
    pub worked_minutes: i64,
    pub final_status: FinalStatus,
    pub session_status: SessionStatus,
    pub evidence_url: Option<String>,
    pub location: Option<String>,
    pub source: Option<String>,
}

/// Raw `attendance` row; enums are kept as their stored strings.
#[derive(Debug, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub employee_id: u64,
    pub day: NaiveDate,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
    pub session_status: String,
    pub final_status: String,
    pub worked_minutes: i64,
    pub check_in_evidence_url: Option<String>,
    pub check_out_evidence_url: Option<String>,
    pub check_in_location: Option<String>,
    pub check_out_location: Option<String>,
    pub check_in_source: Option<String>,
    pub check_out_source: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let session_status = row
            .session_status
            .parse::<SessionStatus>()
            .map_err(|_| StoreError::Corrupt(format!("session_status '{}'", row.session_status)))?;
        let final_status = row
            .final_status
            .parse::<FinalStatus>()
            .map_err(|_| StoreError::Corrupt(format!("final_status '{}'", row.final_status)))?;

        Ok(AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            day: row.day,
            check_in_at: row.check_in_at,
            check_out_at: row.check_out_at,
            session_status,
            final_status,
            worked_minutes: row.worked_minutes,
            check_in_evidence_url: row.check_in_evidence_url,
            check_out_evidence_url: row.check_out_evidence_url,
            check_in_location: row.check_in_location,
            check_out_location: row.check_out_location,
            check_in_source: row.check_in_source,
            check_out_source: row.check_out_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(session_status: &str, final_status: &str) -> AttendanceRow {
        let day = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        AttendanceRow {
            id: 7,
            employee_id: 1000,
            day,
            check_in_at: day.and_hms_opt(9, 30, 0),
            check_out_at: None,
            session_status: session_status.to_string(),
            final_status: final_status.to_string(),
            worked_minutes: 0,
            check_in_evidence_url: Some("u".into()),
            check_out_evidence_url: None,
            check_in_location: None,
            check_out_location: None,
            check_in_source: None,
            check_out_source: None,
        }
    }

    #[test]
    fn statuses_use_snake_case_storage_names() {
        assert_eq!(SessionStatus::AutoStopped.as_str(), "auto_stopped");
        assert_eq!(FinalStatus::HalfDay.as_str(), "half_day");
        for status in [FinalStatus::Present, FinalStatus::HalfDay, FinalStatus::Weekend] {
            assert_eq!(status.as_str().parse::<FinalStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_value(SessionStatus::AutoStopped).unwrap(),
            serde_json::json!("auto_stopped")
        );
    }

    #[test]
    fn row_converts_into_record() {
        let record = AttendanceRecord::try_from(row("active", "absent")).unwrap();
        assert_eq!(record.session_status, SessionStatus::Active);
        assert_eq!(record.final_status, FinalStatus::Absent);
        assert!(record.is_open());
        assert!(!record.needs_check_out_evidence());
    }

    #[test]
    fn unknown_status_is_reported_as_corrupt() {
        let err = AttendanceRecord::try_from(row("paused", "absent")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
