use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use strum::IntoEnumIterator;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::model::leave_request::{
    HalfDaySession, LeaveApplication, LeaveBalance, LeaveStatus, LeaveTransition, LeaveType,
    NewLeave,
};
use crate::service::policy::LeavePolicy;
use crate::store::{LeaveFilter, LeaveStore, Page};

#[derive(Debug, Clone)]
pub struct ApplyLeave {
    pub employee_id: u64,
    pub leave_type: LeaveType,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub is_half_day: bool,
    pub half_day_session: Option<HalfDaySession>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn status(self) -> LeaveStatus {
        match self {
            Decision::Approve => LeaveStatus::Approved,
            Decision::Reject => LeaveStatus::Rejected,
        }
    }
}

/// Leave applications: conflict detection, yearly balances and the
/// pending -> approved/rejected/cancelled lifecycle.
pub struct LeaveLedger {
    leaves: Arc<dyn LeaveStore>,
    policy: LeavePolicy,
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate), AppError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .zip(NaiveDate::from_ymd_opt(year, 12, 31))
        .ok_or_else(|| AppError::validation(format!("Invalid year {year}")))
}

impl LeaveLedger {
    pub fn new(leaves: Arc<dyn LeaveStore>, policy: LeavePolicy) -> Self {
        Self { leaves, policy }
    }

    #[instrument(skip(self, cmd), fields(employee_id = cmd.employee_id))]
    pub async fn apply(
        &self,
        cmd: ApplyLeave,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        if cmd.to_date < cmd.from_date {
            return Err(AppError::validation("to_date cannot be before from_date"));
        }
        if cmd.is_half_day {
            if cmd.from_date != cmd.to_date {
                return Err(AppError::validation(
                    "Half-day leave must start and end on the same day",
                ));
            }
            if cmd.half_day_session.is_none() {
                return Err(AppError::validation(
                    "half_day_session is required for half-day leave",
                ));
            }
        } else if cmd.half_day_session.is_some() {
            return Err(AppError::validation(
                "half_day_session is only allowed for half-day leave",
            ));
        }

        let total_days = if cmd.is_half_day {
            0.5
        } else {
            ((cmd.to_date - cmd.from_date).num_days() + 1) as f64
        };

        let overlapping = self
            .leaves
            .find_overlapping(cmd.employee_id, cmd.from_date, cmd.to_date)
            .await?;
        if let Some(existing) = overlapping.first() {
            return Err(AppError::conflict(format!(
                "Overlaps with leave #{} ({} to {}, {})",
                existing.id,
                existing.from_date,
                existing.to_date,
                existing.status.as_str()
            )));
        }

        if let Some(allocated) = self.policy.allocation(cmd.leave_type) {
            let (start, end) = year_bounds(cmd.from_date.year())?;
            let used = self
                .leaves
                .approved_days_by_type(cmd.employee_id, start, end)
                .await?
                .get(&cmd.leave_type)
                .copied()
                .unwrap_or(0.0);
            let remaining = allocated - used;
            if remaining <= 0.0 || total_days > remaining {
                let remaining = remaining.max(0.0);
                return Err(AppError::validation(format!(
                    "Insufficient {} leave balance: requested {} day(s), {} remaining, short by {} day(s)",
                    cmd.leave_type.as_str(),
                    total_days,
                    remaining,
                    total_days - remaining
                )));
            }
        }

        let leave = self
            .leaves
            .insert(&NewLeave {
                employee_id: cmd.employee_id,
                leave_type: cmd.leave_type,
                from_date: cmd.from_date,
                to_date: cmd.to_date,
                total_days,
                is_half_day: cmd.is_half_day,
                half_day_session: cmd.half_day_session,
                reason: cmd.reason,
                created_at: now,
            })
            .await?;

        info!(
            target: "audit",
            action = "leave.applied",
            employee_id = leave.employee_id,
            leave_id = leave.id,
            leave_type = leave.leave_type.as_str(),
            total_days = leave.total_days,
            "Leave applied"
        );
        Ok(leave)
    }

    #[instrument(skip(self, note))]
    pub async fn review(
        &self,
        id: u64,
        decision: Decision,
        reviewer: u64,
        note: Option<String>,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if decision == Decision::Reject && note.is_none() {
            return Err(AppError::validation("A reason is required to reject leave"));
        }

        let leave = self.get(id).await?;
        if leave.status != LeaveStatus::Pending {
            return Err(AppError::conflict("Leave application already processed"));
        }

        let change = LeaveTransition {
            from: vec![LeaveStatus::Pending],
            to: decision.status(),
            reviewed_by: Some(reviewer),
            reviewed_at: Some(now),
            decision_note: note,
        };
        if !self.leaves.transition(id, &change).await? {
            return Err(AppError::conflict("Leave application already processed"));
        }

        info!(
            target: "audit",
            action = "leave.reviewed",
            leave_id = id,
            employee_id = leave.employee_id,
            reviewer,
            status = change.to.as_str(),
            "Leave reviewed"
        );
        self.get(id).await
    }

    /// Cancels the actor's own application before it starts.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: u64,
        actor_employee_id: u64,
        now: NaiveDateTime,
    ) -> Result<LeaveApplication, AppError> {
        let leave = self.get(id).await?;
        if leave.employee_id != actor_employee_id {
            return Err(AppError::precondition("Only the applicant can cancel"));
        }
        if !leave.status.is_active() {
            return Err(AppError::precondition("Leave application already processed"));
        }
        if now.date() >= leave.from_date {
            return Err(AppError::precondition("Leave has already started"));
        }

        let change = LeaveTransition {
            from: vec![LeaveStatus::Pending, LeaveStatus::Approved],
            to: LeaveStatus::Cancelled,
            reviewed_by: None,
            reviewed_at: None,
            decision_note: None,
        };
        if !self.leaves.transition(id, &change).await? {
            return Err(AppError::precondition("Leave application already processed"));
        }

        info!(
            target: "audit",
            action = "leave.cancelled",
            leave_id = id,
            employee_id = actor_employee_id,
            previous = leave.status.as_str(),
            "Leave cancelled"
        );
        self.get(id).await
    }

    /// Allocation, approved usage and remainder for every leave type in `year`.
    /// `remaining` may go negative if allocations were lowered.
    pub async fn balance(
        &self,
        employee_id: u64,
        year: i32,
    ) -> Result<BTreeMap<LeaveType, LeaveBalance>, AppError> {
        let (start, end) = year_bounds(year)?;
        let used = self
            .leaves
            .approved_days_by_type(employee_id, start, end)
            .await?;

        Ok(LeaveType::iter()
            .map(|leave_type| {
                let used = used.get(&leave_type).copied().unwrap_or(0.0);
                let allocated = self.policy.allocation(leave_type);
                (
                    leave_type,
                    LeaveBalance {
                        allocated,
                        used,
                        remaining: allocated.map(|a| a - used),
                    },
                )
            })
            .collect())
    }

    pub async fn get(&self, id: u64) -> Result<LeaveApplication, AppError> {
        self.leaves
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Leave application {id} not found")))
    }

    pub async fn list(&self, filter: &LeaveFilter) -> Result<Page<LeaveApplication>, AppError> {
        Ok(self.leaves.list(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn noon(day: NaiveDate) -> NaiveDateTime {
        day.and_hms_opt(12, 0, 0).unwrap()
    }

    fn ledger() -> LeaveLedger {
        LeaveLedger::new(Arc::new(MemoryStore::new()), LeavePolicy::default())
    }

    fn request(leave_type: LeaveType, from: NaiveDate, to: NaiveDate) -> ApplyLeave {
        ApplyLeave {
            employee_id: 1000,
            leave_type,
            from_date: from,
            to_date: to,
            is_half_day: false,
            half_day_session: None,
            reason: Some("personal".into()),
        }
    }

    async fn approved(ledger: &LeaveLedger, cmd: ApplyLeave) -> LeaveApplication {
        let leave = ledger.apply(cmd, noon(date(1, 2))).await.unwrap();
        ledger
            .review(leave.id, Decision::Approve, 2, None, noon(date(1, 3)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn apply_creates_pending_with_inclusive_day_count() {
        let ledger = ledger();
        let leave = ledger
            .apply(request(LeaveType::Annual, date(3, 10), date(3, 12)), noon(date(3, 1)))
            .await
            .unwrap();
        assert_eq!(leave.status, LeaveStatus::Pending);
        assert_eq!(leave.total_days, 3.0);
    }

    #[tokio::test]
    async fn inverted_range_is_invalid() {
        let err = ledger()
            .apply(request(LeaveType::Annual, date(3, 12), date(3, 10)), noon(date(3, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn half_day_rules() {
        let ledger = ledger();

        let mut cmd = request(LeaveType::Sick, date(3, 11), date(3, 11));
        cmd.is_half_day = true;
        cmd.half_day_session = Some(HalfDaySession::Afternoon);
        let leave = ledger.apply(cmd.clone(), noon(date(3, 1))).await.unwrap();
        assert_eq!(leave.total_days, 0.5);
        assert_eq!(leave.half_day_session, Some(HalfDaySession::Afternoon));

        let mut multi = cmd.clone();
        multi.from_date = date(4, 1);
        multi.to_date = date(4, 2);
        assert!(matches!(
            ledger.apply(multi, noon(date(3, 1))).await,
            Err(AppError::Validation(_))
        ));

        let mut no_session = cmd.clone();
        no_session.from_date = date(4, 3);
        no_session.to_date = date(4, 3);
        no_session.half_day_session = None;
        assert!(matches!(
            ledger.apply(no_session, noon(date(3, 1))).await,
            Err(AppError::Validation(_))
        ));

        let mut stray_session = request(LeaveType::Sick, date(4, 4), date(4, 4));
        stray_session.half_day_session = Some(HalfDaySession::Morning);
        assert!(matches!(
            ledger.apply(stray_session, noon(date(3, 1))).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn overlapping_active_leave_conflicts() {
        let ledger = ledger();
        approved(&ledger, request(LeaveType::Annual, date(3, 10), date(3, 12))).await;

        let err = ledger
            .apply(request(LeaveType::Annual, date(3, 11), date(3, 13)), noon(date(3, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let ok = ledger
            .apply(request(LeaveType::Annual, date(3, 13), date(3, 14)), noon(date(3, 1)))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn rejected_leave_frees_its_range() {
        let ledger = ledger();
        let leave = ledger
            .apply(request(LeaveType::Annual, date(5, 6), date(5, 7)), noon(date(5, 1)))
            .await
            .unwrap();
        ledger
            .review(leave.id, Decision::Reject, 2, Some("busy week".into()), noon(date(5, 2)))
            .await
            .unwrap();

        assert!(ledger
            .apply(request(LeaveType::Annual, date(5, 7), date(5, 8)), noon(date(5, 2)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn balance_counts_approved_days_and_blocks_shortfall() {
        let ledger = ledger();
        approved(&ledger, request(LeaveType::Casual, date(3, 4), date(3, 8))).await;

        let balance = ledger.balance(1000, 2024).await.unwrap();
        let casual = &balance[&LeaveType::Casual];
        assert_eq!(casual.allocated, Some(12.0));
        assert_eq!(casual.used, 5.0);
        assert_eq!(casual.remaining, Some(7.0));
        assert_eq!(balance[&LeaveType::Unpaid].remaining, None);
        assert_eq!(balance.len(), 4);

        let err = ledger
            .apply(request(LeaveType::Casual, date(4, 1), date(4, 8)), noon(date(3, 20)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("requested 8"));
        assert!(err.to_string().contains("7 remaining"));
        assert!(err.to_string().ends_with("short by 1 day(s)"));

        // unpaid has no ceiling
        assert!(ledger
            .apply(request(LeaveType::Unpaid, date(6, 1), date(6, 30)), noon(date(3, 20)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn balance_is_scoped_to_the_year_of_from_date() {
        let ledger = ledger();
        approved(&ledger, request(LeaveType::Sick, date(12, 30), date(12, 31))).await;

        assert_eq!(ledger.balance(1000, 2024).await.unwrap()[&LeaveType::Sick].used, 2.0);
        assert_eq!(ledger.balance(1000, 2025).await.unwrap()[&LeaveType::Sick].used, 0.0);
    }

    #[tokio::test]
    async fn review_is_one_way_and_reject_needs_reason() {
        let ledger = ledger();
        let leave = ledger
            .apply(request(LeaveType::Annual, date(3, 10), date(3, 12)), noon(date(3, 1)))
            .await
            .unwrap();

        let err = ledger
            .review(leave.id, Decision::Reject, 2, Some("  ".into()), noon(date(3, 2)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let reviewed = ledger
            .review(leave.id, Decision::Approve, 2, Some("enjoy".into()), noon(date(3, 2)))
            .await
            .unwrap();
        assert_eq!(reviewed.status, LeaveStatus::Approved);
        assert_eq!(reviewed.reviewed_by, Some(2));
        assert_eq!(reviewed.reviewed_at, Some(noon(date(3, 2))));
        assert_eq!(reviewed.decision_note.as_deref(), Some("enjoy"));

        let err = ledger
            .review(leave.id, Decision::Reject, 2, Some("late".into()), noon(date(3, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = ledger
            .review(999, Decision::Approve, 2, None, noon(date(3, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_only_before_start() {
        let ledger = ledger();
        let tomorrow = approved(&ledger, request(LeaveType::Annual, date(3, 12), date(3, 13))).await;
        let started = approved(&ledger, request(LeaveType::Annual, date(3, 10), date(3, 11))).await;
        let today = date(3, 11);

        let cancelled = ledger.cancel(tomorrow.id, 1000, noon(today)).await.unwrap();
        assert_eq!(cancelled.status, LeaveStatus::Cancelled);
        // reviewer fields survive cancellation
        assert_eq!(cancelled.reviewed_by, Some(2));

        let err = ledger.cancel(started.id, 1000, noon(today)).await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
        assert_eq!(err.to_string(), "Leave has already started");

        let err = ledger.cancel(tomorrow.id, 1000, noon(date(3, 1))).await.unwrap_err();
        assert_eq!(err.to_string(), "Leave application already processed");
    }

    #[tokio::test]
    async fn cancel_by_someone_else_is_refused() {
        let ledger = ledger();
        let leave = ledger
            .apply(request(LeaveType::Annual, date(3, 20), date(3, 21)), noon(date(3, 1)))
            .await
            .unwrap();

        let err = ledger.cancel(leave.id, 1001, noon(date(3, 2))).await.unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
        assert_eq!(ledger.get(leave.id).await.unwrap().status, LeaveStatus::Pending);
    }
}
