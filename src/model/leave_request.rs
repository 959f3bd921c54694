use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::StoreError;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Casual,
    Sick,
    Unpaid,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "annual",
            LeaveType::Casual => "casual",
            LeaveType::Sick => "sick",
            LeaveType::Unpaid => "unpaid",
        }
    }

    /// Unpaid leave has no yearly ceiling.
    pub fn is_unlimited(&self) -> bool {
        matches!(self, LeaveType::Unpaid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
            LeaveStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and approved applications hold their date range.
    pub fn is_active(&self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HalfDaySession {
    Morning,
    Afternoon,
}

impl HalfDaySession {
    pub fn as_str(&self) -> &'static str {
        match self {
            HalfDaySession::Morning => "morning",
            HalfDaySession::Afternoon => "afternoon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "employee_id": 1000,
    "leave_type": "casual",
    "from_date": "2024-03-10",
    "to_date": "2024-03-12",
    "total_days": 3.0,
    "status": "approved",
    "is_half_day": false,
    "half_day_session": null,
    "reason": "Family event",
    "reviewed_by": 2,
    "reviewed_at": "2024-03-01T11:20:00",
    "decision_note": null,
    "created_at": "2024-02-28T16:02:11"
}))]
pub struct LeaveApplication {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date")]
    pub from_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to_date: NaiveDate,
    pub total_days: f64,
    pub status: LeaveStatus,
    pub is_half_day: bool,
    pub half_day_session: Option<HalfDaySession>,
    pub reason: Option<String>,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<NaiveDateTime>,
    pub decision_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

impl LeaveApplication {
    /// Inclusive range overlap against `[from, to]`.
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from_date <= to && self.to_date >= from
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.overlaps(day, day)
    }
}

/// A validated application ready to be persisted as pending.
#[derive(Debug, Clone)]
pub struct NewLeave {
    pub employee_id: u64,
    pub leave_type: LeaveType,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub total_days: f64,
    pub is_half_day: bool,
    pub half_day_session: Option<HalfDaySession>,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Status change applied only if the current status is one of `from`.
#[derive(Debug, Clone)]
pub struct LeaveTransition {
    pub from: Vec<LeaveStatus>,
    pub to: LeaveStatus,
    pub reviewed_by: Option<u64>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub decision_note: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct LeaveRow {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub total_days: f64,
    pub status: String,
    pub is_half_day: bool,
    pub half_day_session: Option<String>,
    pub reason: Option<String>,
    pub reviewed_by: Option<u64>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub decision_note: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<LeaveRow> for LeaveApplication {
    type Error = StoreError;

    fn try_from(row: LeaveRow) -> Result<Self, Self::Error> {
        let leave_type = row
            .leave_type
            .parse::<LeaveType>()
            .map_err(|_| StoreError::Corrupt(format!("leave_type '{}'", row.leave_type)))?;
        let status = row
            .status
            .parse::<LeaveStatus>()
            .map_err(|_| StoreError::Corrupt(format!("status '{}'", row.status)))?;
        let half_day_session = match row.half_day_session.as_deref() {
            Some(s) => Some(
                s.parse::<HalfDaySession>()
                    .map_err(|_| StoreError::Corrupt(format!("half_day_session '{}'", s)))?,
            ),
            None => None,
        };

        Ok(LeaveApplication {
            id: row.id,
            employee_id: row.employee_id,
            leave_type,
            from_date: row.from_date,
            to_date: row.to_date,
            total_days: row.total_days,
            status,
            is_half_day: row.is_half_day,
            half_day_session,
            reason: row.reason,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            decision_note: row.decision_note,
            created_at: row.created_at,
        })
    }
}

/// Balance of one leave type for one calendar year.
///
/// `allocated` and `remaining` are `None` for unlimited types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LeaveBalance {
    pub allocated: Option<f64>,
    pub used: f64,
    pub remaining: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn application(from: NaiveDate, to: NaiveDate) -> LeaveApplication {
        LeaveApplication {
            id: 1,
            employee_id: 1000,
            leave_type: LeaveType::Casual,
            from_date: from,
            to_date: to,
            total_days: 3.0,
            status: LeaveStatus::Approved,
            is_half_day: false,
            half_day_session: None,
            reason: None,
            reviewed_by: None,
            reviewed_at: None,
            decision_note: None,
            created_at: from.and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn overlap_is_inclusive_on_both_ends() {
        let leave = application(date(2024, 3, 10), date(2024, 3, 12));
        assert!(leave.overlaps(date(2024, 3, 11), date(2024, 3, 13)));
        assert!(leave.overlaps(date(2024, 3, 12), date(2024, 3, 12)));
        assert!(leave.overlaps(date(2024, 3, 1), date(2024, 3, 10)));
        assert!(!leave.overlaps(date(2024, 3, 13), date(2024, 3, 14)));
        assert!(!leave.overlaps(date(2024, 3, 1), date(2024, 3, 9)));
    }

    #[test]
    fn only_pending_and_approved_are_active() {
        assert!(LeaveStatus::Pending.is_active());
        assert!(LeaveStatus::Approved.is_active());
        assert!(!LeaveStatus::Rejected.is_active());
        assert!(!LeaveStatus::Cancelled.is_active());
    }

    #[test]
    fn leave_type_parses_lowercase() {
        assert_eq!("casual".parse::<LeaveType>().unwrap(), LeaveType::Casual);
        assert!("holiday".parse::<LeaveType>().is_err());
        assert!(LeaveType::Unpaid.is_unlimited());
        assert!(!LeaveType::Sick.is_unlimited());
    }
}
