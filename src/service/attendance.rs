//! Attendance session manager: the per-employee, per-day check-in/check-out
//! state machine, auto-stop reconciliation and day-status resolution.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, StoreError};
use crate::model::attendance::{AttendanceRecord, FinalStatus, NewCheckIn, SessionClose};
use crate::service::policy::OfficePolicy;
use crate::store::{AttendanceFilter, AttendanceStore, HolidayCalendar, LeaveStore, Page};
use crate::utils::evidence_store::EvidenceStore;

/// Photo attached to a check-in or check-out.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub bytes: Vec<u8>,
}

/// Check-in or check-out request after boundary validation.
#[derive(Debug, Clone)]
pub struct Punch {
    pub employee_id: u64,
    pub evidence: Option<Evidence>,
    pub location: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PunchKind {
    CheckIn,
    CheckOut,
}

impl PunchKind {
    fn as_str(&self) -> &'static str {
        match self {
            PunchKind::CheckIn => "check-in",
            PunchKind::CheckOut => "check-out",
        }
    }
}

/// Today's reconciled view for one employee.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TodayStatus {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub record: Option<AttendanceRecord>,
    pub day_status: FinalStatus,
    pub can_check_in: bool,
    pub can_check_out: bool,
    #[schema(value_type = String, format = "date-time")]
    pub check_in_cutoff: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub office_end: NaiveDateTime,
}

/// Recognised image formats: `(extension, content type)`.
fn sniff_image(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(("jpg", "image/jpeg"))
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(("png", "image/png"))
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(("webp", "image/webp"))
    } else {
        None
    }
}

pub struct AttendanceService {
    attendance: Arc<dyn AttendanceStore>,
    leaves: Arc<dyn LeaveStore>,
    holidays: Arc<dyn HolidayCalendar>,
    evidence: Arc<dyn EvidenceStore>,
    policy: OfficePolicy,
    max_evidence_bytes: usize,
}

impl AttendanceService {
    pub fn new(
        attendance: Arc<dyn AttendanceStore>,
        leaves: Arc<dyn LeaveStore>,
        holidays: Arc<dyn HolidayCalendar>,
        evidence: Arc<dyn EvidenceStore>,
        policy: OfficePolicy,
        max_evidence_bytes: usize,
    ) -> Self {
        Self {
            attendance,
            leaves,
            holidays,
            evidence,
            policy,
            max_evidence_bytes,
        }
    }

    pub fn policy(&self) -> &OfficePolicy {
        &self.policy
    }

    #[instrument(skip(self, punch), fields(employee_id = punch.employee_id))]
    pub async fn check_in(
        &self,
        punch: Punch,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AppError> {
        let employee_id = punch.employee_id;
        let evidence = punch
            .evidence
            .ok_or_else(|| AppError::validation("Check-in photo is required"))?;
        let (ext, content_type) = self.check_evidence(&evidence)?;

        let day = now.date();
        self.ensure_working_day(employee_id, day).await?;

        if let Some(existing) = self.attendance.find_by_day(employee_id, day).await?
            && existing.check_in_at.is_some()
        {
            return Err(AppError::conflict("Already checked in today"));
        }
        if now > self.policy.office_end_on(day) {
            return Err(AppError::precondition("Office time has ended for today"));
        }
        if now > self.policy.check_in_cutoff_on(day) {
            return Err(AppError::precondition(format!(
                "Check-in window closed at {}",
                self.policy.midpoint().format("%H:%M")
            )));
        }

        let object = object_name(employee_id, day, PunchKind::CheckIn, ext);
        let evidence_url = self
            .evidence
            .upload(&object, evidence.bytes, content_type)
            .await?;

        let new = NewCheckIn {
            employee_id,
            day,
            check_in_at: now,
            evidence_url,
            location: punch.location,
            source: punch.source,
        };
        let record = match self.attendance.insert_check_in(&new).await {
            Ok(record) => record,
            Err(StoreError::Duplicate) => {
                tracing::warn!(employee_id, %day, object = %object, "Lost check-in race, evidence orphaned");
                return Err(AppError::conflict("Already checked in today"));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            target: "audit",
            action = "attendance.check_in",
            employee_id,
            record_id = record.id,
            at = %now,
            "Checked in"
        );
        Ok(record)
    }

    #[instrument(skip(self, punch), fields(employee_id = punch.employee_id))]
    pub async fn check_out(
        &self,
        punch: Punch,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AppError> {
        let employee_id = punch.employee_id;
        let day = now.date();
        self.ensure_working_day(employee_id, day).await?;

        let record = self
            .attendance
            .find_by_day(employee_id, day)
            .await?
            .filter(|r| r.check_in_at.is_some())
            .ok_or_else(|| AppError::not_found("You must check in first"))?;

        if record.is_open() {
            self.close_with_evidence(record, punch, now).await
        } else if record.needs_check_out_evidence() {
            self.patch_check_out_evidence(record, punch).await
        } else {
            Err(AppError::conflict("Already checked out today"))
        }
    }

    async fn close_with_evidence(
        &self,
        record: AttendanceRecord,
        punch: Punch,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AppError> {
        let evidence = punch
            .evidence
            .ok_or_else(|| AppError::validation("Check-out photo is required"))?;
        let (ext, content_type) = self.check_evidence(&evidence)?;

        let check_in_at = record
            .check_in_at
            .ok_or_else(|| AppError::Internal(format!("record {} has no check-in", record.id)))?;
        let closing = self.policy.close(check_in_at, now);
        if closing.check_out_at <= check_in_at {
            return Err(AppError::precondition(
                "Check-out must be later than check-in",
            ));
        }

        let object = object_name(record.employee_id, record.day, PunchKind::CheckOut, ext);
        let evidence_url = self
            .evidence
            .upload(&object, evidence.bytes, content_type)
            .await?;

        let close = SessionClose {
            check_out_at: closing.check_out_at,
            worked_minutes: closing.worked_minutes,
            final_status: closing.final_status,
            session_status: closing.session_status,
            evidence_url: Some(evidence_url),
            location: punch.location,
            source: punch.source,
        };
        if !self.attendance.close_session(record.id, &close).await? {
            return Err(AppError::conflict("Already checked out today"));
        }

        info!(
            target: "audit",
            action = "attendance.check_out",
            employee_id = record.employee_id,
            record_id = record.id,
            worked_minutes = closing.worked_minutes,
            final_status = closing.final_status.as_str(),
            session_status = closing.session_status.as_str(),
            "Checked out"
        );
        self.reload(record.employee_id, record.day).await
    }

    /// Adds the missing check-out photo to a closed session of today.
    /// Timestamps and status stay as they are.
    async fn patch_check_out_evidence(
        &self,
        record: AttendanceRecord,
        punch: Punch,
    ) -> Result<AttendanceRecord, AppError> {
        let evidence = punch
            .evidence
            .ok_or_else(|| AppError::validation("Check-out photo is required"))?;
        let (ext, content_type) = self.check_evidence(&evidence)?;

        let object = object_name(record.employee_id, record.day, PunchKind::CheckOut, ext);
        let evidence_url = self
            .evidence
            .upload(&object, evidence.bytes, content_type)
            .await?;

        if !self
            .attendance
            .attach_check_out_evidence(record.id, &evidence_url)
            .await?
        {
            return Err(AppError::conflict("Already checked out today"));
        }

        info!(
            target: "audit",
            action = "attendance.check_out_evidence",
            employee_id = record.employee_id,
            record_id = record.id,
            "Check-out evidence attached"
        );
        self.reload(record.employee_id, record.day).await
    }

    /// Reconciles today's record and reports what the employee can do next.
    #[instrument(skip(self))]
    pub async fn today_status(
        &self,
        employee_id: u64,
        now: NaiveDateTime,
    ) -> Result<TodayStatus, AppError> {
        let day = now.date();
        self.reconcile_earlier_days(employee_id, now).await?;
        let record = match self.attendance.find_by_day(employee_id, day).await? {
            Some(record) => Some(self.reconcile(record, now).await?),
            None => None,
        };

        let off_day = self.off_day_status(employee_id, day).await?;
        let working = off_day.is_none();
        let day_status = match &record {
            Some(r) if r.check_out_at.is_some() => r.final_status,
            _ => self.resolve_day_status(employee_id, day).await?,
        };

        let can_check_in = working
            && record.as_ref().is_none_or(|r| r.check_in_at.is_none())
            && now <= self.policy.check_in_cutoff_on(day);
        let can_check_out = working
            && record
                .as_ref()
                .is_some_and(|r| r.is_open() || r.needs_check_out_evidence());

        Ok(TodayStatus {
            date: day,
            record,
            day_status,
            can_check_in,
            can_check_out,
            check_in_cutoff: self.policy.check_in_cutoff_on(day),
            office_end: self.policy.office_end_on(day),
        })
    }

    /// Closes `record` at its office end if it is still open after that
    /// point. Returns the stored record, reconciled or not.
    async fn reconcile(
        &self,
        record: AttendanceRecord,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AppError> {
        let Some(check_in_at) = record.check_in_at else {
            return Ok(record);
        };
        if !record.is_open() || now <= self.policy.office_end_on(record.day) {
            return Ok(record);
        }

        let closing = self.policy.close(check_in_at, now);
        let close = SessionClose {
            check_out_at: closing.check_out_at,
            worked_minutes: closing.worked_minutes,
            final_status: closing.final_status,
            session_status: closing.session_status,
            evidence_url: None,
            location: None,
            source: Some("auto-stop".to_string()),
        };
        if self.attendance.close_session(record.id, &close).await? {
            info!(
                target: "audit",
                action = "attendance.auto_stop",
                employee_id = record.employee_id,
                record_id = record.id,
                day = %record.day,
                worked_minutes = closing.worked_minutes,
                final_status = closing.final_status.as_str(),
                "Session auto-stopped"
            );
        }
        self.reload(record.employee_id, record.day).await
    }

    /// Closes the employee's sessions still open from before `now`'s day.
    async fn reconcile_earlier_days(
        &self,
        employee_id: u64,
        now: NaiveDateTime,
    ) -> Result<(), AppError> {
        let Some(yesterday) = now.date().pred_opt() else {
            return Ok(());
        };
        let stale = self.attendance.list_open_sessions(yesterday).await?;
        for record in stale.into_iter().filter(|r| r.employee_id == employee_id) {
            self.reconcile(record, now).await?;
        }
        Ok(())
    }

    /// Auto-stops every session left open past its day's office end.
    /// Returns how many sessions were closed.
    #[instrument(skip(self))]
    pub async fn sweep_auto_stop(&self, now: NaiveDateTime) -> Result<usize, AppError> {
        let open = self.attendance.list_open_sessions(now.date()).await?;
        let mut closed = 0;
        for record in open {
            if now <= self.policy.office_end_on(record.day) {
                continue;
            }
            let reconciled = self.reconcile(record, now).await?;
            if reconciled.check_out_at.is_some() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "Auto-stop sweep finished");
        }
        Ok(closed)
    }

    /// Status of a day with no completed record: rest day, holiday, approved
    /// leave (full or half day) or absence.
    pub async fn resolve_day_status(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<FinalStatus, AppError> {
        if let Some(status) = self.off_day_status(employee_id, day).await? {
            return Ok(status);
        }
        let status = match self.leaves.approved_covering(employee_id, day).await? {
            Some(leave) if leave.is_half_day => FinalStatus::HalfDay,
            Some(_) => FinalStatus::Leave,
            None => FinalStatus::Absent,
        };
        Ok(status)
    }

    /// Lists records, reconciling open sessions whose office end has passed.
    pub async fn list(
        &self,
        filter: &AttendanceFilter,
        now: NaiveDateTime,
    ) -> Result<Page<AttendanceRecord>, AppError> {
        let mut page = self.attendance.list(filter).await?;
        for record in page.data.iter_mut() {
            if record.is_open() && now > self.policy.office_end_on(record.day) {
                *record = self.reconcile(record.clone(), now).await?;
            }
        }
        Ok(page)
    }

    async fn off_day_status(
        &self,
        employee_id: u64,
        day: NaiveDate,
    ) -> Result<Option<FinalStatus>, AppError> {
        if self.policy.is_weekend(day) {
            return Ok(Some(FinalStatus::Weekend));
        }
        if self.holidays.is_holiday(day, employee_id).await?.is_some() {
            return Ok(Some(FinalStatus::Holiday));
        }
        Ok(None)
    }

    async fn ensure_working_day(&self, employee_id: u64, day: NaiveDate) -> Result<(), AppError> {
        if self.policy.is_weekend(day) {
            return Err(AppError::precondition("Today is a weekly rest day"));
        }
        if let Some(holiday) = self.holidays.is_holiday(day, employee_id).await? {
            return Err(AppError::precondition(format!(
                "Today is a holiday: {}",
                holiday.name
            )));
        }
        Ok(())
    }

    fn check_evidence(&self, evidence: &Evidence) -> Result<(&'static str, &'static str), AppError> {
        if evidence.bytes.is_empty() {
            return Err(AppError::validation("Evidence photo is empty"));
        }
        if evidence.bytes.len() > self.max_evidence_bytes {
            return Err(AppError::validation(format!(
                "Evidence photo exceeds {} bytes",
                self.max_evidence_bytes
            )));
        }
        sniff_image(&evidence.bytes)
            .ok_or_else(|| AppError::validation("Evidence must be a JPEG, PNG or WebP image"))
    }

    async fn reload(&self, employee_id: u64, day: NaiveDate) -> Result<AttendanceRecord, AppError> {
        self.attendance
            .find_by_day(employee_id, day)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("attendance of {employee_id} on {day} vanished"))
            })
    }
}

fn object_name(employee_id: u64, day: NaiveDate, kind: PunchKind, ext: &str) -> String {
    format!(
        "attendance/{}/{}/{}-{}.{}",
        employee_id,
        day,
        kind.as_str(),
        Uuid::new_v4(),
        ext
    )
}
