use actix_web::{HttpResponse, web};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::{current_employee, current_employee_opt, profiles_for, too_many_requests};
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::attendance::{AttendanceRecord, FinalStatus};
use crate::model::employee::EmployeeProfile;
use crate::service::attendance::{AttendanceService, Evidence, Punch};
use crate::store::{AttendanceFilter, EmployeeDirectory, Pagination};
use crate::utils::clock::Clock;
use crate::utils::rate_limiter::RateLimiter;

#[derive(Deserialize, ToSchema)]
pub struct PunchRequest {
    /// Photo taken at the punch, base64 encoded (a `data:image/...;base64,`
    /// prefix is accepted)
    #[schema(example = "/9j/4AAQSkZJRgABAQAAAQABAAD...")]
    pub evidence: Option<String>,
    #[schema(example = "23.7806,90.4070")]
    pub location: Option<String>,
    #[schema(example = "mobile")]
    pub source: Option<String>,
}

fn decode_evidence(raw: Option<&str>) -> Result<Option<Evidence>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let payload = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| AppError::validation(format!("evidence is not valid base64: {e}")))?;
    Ok(Some(Evidence { bytes }))
}

impl PunchRequest {
    fn into_punch(self, employee_id: u64) -> Result<Punch, AppError> {
        Ok(Punch {
            employee_id,
            evidence: decode_evidence(self.evidence.as_deref())?,
            location: self.location,
            source: self.source,
        })
    }
}

/// Attendance row with the employee's directory profile attached.
#[derive(Serialize, ToSchema)]
pub struct AttendanceResponse {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    pub employee: Option<EmployeeProfile>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceResponse>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams)]
pub struct AttendanceQuery {
    /// Filter by employee ID (HR/Admin only; others always see their own)
    pub employee_id: Option<u64>,
    /// First day, inclusive
    #[param(value_type = Option<String>, format = "date", example = "2024-03-01")]
    pub from: Option<NaiveDate>,
    /// Last day, inclusive
    #[param(value_type = Option<String>, format = "date", example = "2024-03-31")]
    pub to: Option<NaiveDate>,
    /// Filter by final status
    pub status: Option<FinalStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Pagination per page number
    pub per_page: Option<u64>,
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body(content = PunchRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Checked in", body = AttendanceRecord),
        (status = 400, description = "Missing or invalid evidence"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No employee profile"),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "kind": "conflict",
            "message": "Already checked in today"
        })),
        (status = 422, description = "Rest day, holiday or check-in window closed"),
        (status = 429, description = "Too many attendance requests"),
        (status = 502, description = "Evidence upload failed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    directory: web::Data<dyn EmployeeDirectory>,
    limiter: web::Data<dyn RateLimiter>,
    clock: web::Data<dyn Clock>,
    payload: web::Json<PunchRequest>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = current_employee(&auth, directory.get_ref()).await?;
    if !limiter.allow(&format!("attendance:{employee_id}")).await {
        return Ok(too_many_requests());
    }

    let punch = payload.into_inner().into_punch(employee_id)?;
    let record = service.check_in(punch, clock.now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Check-out endpoint. On a session that is already closed but has no
/// check-out photo, attaches the photo instead.
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(content = PunchRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Checked out (or evidence attached)", body = AttendanceRecord),
        (status = 400, description = "Missing or invalid evidence"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not checked in today", body = Object, example = json!({
            "kind": "not_found",
            "message": "You must check in first"
        })),
        (status = 409, description = "Already checked out today"),
        (status = 422, description = "Rest day or holiday"),
        (status = 429, description = "Too many attendance requests"),
        (status = 502, description = "Evidence upload failed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    directory: web::Data<dyn EmployeeDirectory>,
    limiter: web::Data<dyn RateLimiter>,
    clock: web::Data<dyn Clock>,
    payload: web::Json<PunchRequest>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = current_employee(&auth, directory.get_ref()).await?;
    if !limiter.allow(&format!("attendance:{employee_id}")).await {
        return Ok(too_many_requests());
    }

    let punch = payload.into_inner().into_punch(employee_id)?;
    let record = service.check_out(punch, clock.now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Today's attendance, reconciled (an open session past office end is
/// auto-stopped first).
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's status", body = crate::service::attendance::TodayStatus),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    directory: web::Data<dyn EmployeeDirectory>,
    clock: web::Data<dyn Clock>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = current_employee(&auth, directory.get_ref()).await?;
    let status = service.today_status(employee_id, clock.now()).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn attendance_list(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    directory: web::Data<dyn EmployeeDirectory>,
    clock: web::Data<dyn Clock>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<HttpResponse> {
    let query = query.into_inner();
    let own = current_employee_opt(&auth, directory.get_ref()).await?;

    let employee_id = if auth.role.is_hr_or_admin() {
        query.employee_id
    } else {
        let own = own.ok_or_else(|| AppError::not_found("No employee profile linked to this account"))?;
        auth.require_self_or_hr(Some(own), query.employee_id.unwrap_or(own))?;
        Some(own)
    };

    let filter = AttendanceFilter {
        employee_id,
        from: query.from,
        to: query.to,
        final_status: query.status,
        pagination: Pagination::new(query.page, query.per_page),
    };
    let page = service.list(&filter, clock.now()).await?;

    let profiles = profiles_for(directory.get_ref(), page.data.iter().map(|r| r.employee_id)).await?;
    let page = page.map(|record| AttendanceResponse {
        employee: profiles.get(&record.employee_id).cloned(),
        record,
    });

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data: page.data,
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }))
}

#[cfg(test)]
mod decode_tests {
    use super::*;
    use crate::service::attendance::tests::JPEG;

    #[test]
    fn evidence_accepts_data_urls() {
        let encoded = format!("data:image/jpeg;base64,{}", STANDARD.encode(JPEG));
        let evidence = decode_evidence(Some(&encoded)).unwrap().unwrap();
        assert_eq!(evidence.bytes, JPEG);

        assert!(decode_evidence(None).unwrap().is_none());
        assert!(decode_evidence(Some("   ")).unwrap().is_none());
        assert!(matches!(decode_evidence(Some("not base64!")), Err(AppError::Validation(_))));
    }
}
