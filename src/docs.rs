use crate::api::attendance::{AttendanceListResponse, AttendanceResponse, PunchRequest};
use crate::api::leave_request::{
    CreateLeave, LeaveBalanceResponse, LeaveListResponse, LeaveResponse, ReviewRequest,
};
use crate::model::attendance::{AttendanceRecord, FinalStatus, SessionStatus};
use crate::model::employee::EmployeeProfile;
use crate::model::leave_request::{
    HalfDaySession, LeaveApplication, LeaveBalance, LeaveStatus, LeaveType,
};
use crate::service::attendance::TodayStatus;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance & Leave API",
        version = "1.0.0",
        description = r#"
## Daily attendance and leave ledger

### 🔹 Attendance
- Check-in and check-out with a photo and location
- Check-in closes at the middle of the office day; sessions left open past office end are auto-stopped
- Worked minutes decide Present or Absent

### 🔹 Leave
- Apply, approve/reject (HR/Admin) and cancel before the leave starts
- Overlapping pending or approved leave is refused
- Yearly balance per leave type

### 🔐 Security
All endpoints need a **JWT Bearer** access token.

### 📦 Errors
Failures return `{"kind": ..., "message": ...}` with a stable `kind`.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::attendance_list,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::leave_balance,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave
    ),
    components(
        schemas(
            PunchRequest,
            AttendanceRecord,
            AttendanceResponse,
            AttendanceListResponse,
            TodayStatus,
            SessionStatus,
            FinalStatus,
            CreateLeave,
            ReviewRequest,
            LeaveApplication,
            LeaveResponse,
            LeaveListResponse,
            LeaveBalance,
            LeaveBalanceResponse,
            LeaveType,
            LeaveStatus,
            HalfDaySession,
            EmployeeProfile
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Daily check-in/check-out APIs"),
        (name = "Leave", description = "Leave management APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/attendance/check-in",
            "/api/attendance/check-out",
            "/api/attendance/today",
            "/api/attendance",
            "/api/leave",
            "/api/leave/balance",
            "/api/leave/{leave_id}",
            "/api/leave/{leave_id}/approve",
            "/api/leave/{leave_id}/reject",
            "/api/leave/{leave_id}/cancel",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(
            doc.components
                .unwrap()
                .security_schemes
                .contains_key("bearer_auth")
        );
    }
}
