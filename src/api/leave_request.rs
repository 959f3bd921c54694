use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::{current_employee, current_employee_opt, profiles_for};
use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::employee::EmployeeProfile;
use crate::model::leave_request::{
    HalfDaySession, LeaveApplication, LeaveBalance, LeaveStatus, LeaveType,
};
use crate::service::leave::{ApplyLeave, Decision, LeaveLedger};
use crate::store::{EmployeeDirectory, LeaveFilter, Pagination};
use crate::utils::clock::Clock;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "casual")]
    pub leave_type: LeaveType, // enum ensures Swagger dropdown
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub from_date: NaiveDate,
    #[schema(example = "2026-01-06", format = "date", value_type = String)]
    pub to_date: NaiveDate,
    #[serde(default)]
    pub is_half_day: bool,
    #[schema(example = "morning")]
    pub half_day_session: Option<HalfDaySession>,
    #[schema(example = "Family event")]
    pub reason: Option<String>,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct ReviewRequest {
    /// Decision note; required when rejecting
    #[schema(example = "Overlaps with release week")]
    pub note: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveResponse {
    #[serde(flatten)]
    pub leave: LeaveApplication,
    pub employee: Option<EmployeeProfile>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "employee_id": 1000,
    "year": 2024,
    "balances": {
        "annual": { "allocated": 15.0, "used": 3.0, "remaining": 12.0 },
        "casual": { "allocated": 12.0, "used": 5.0, "remaining": 7.0 },
        "sick": { "allocated": 14.0, "used": 0.0, "remaining": 14.0 },
        "unpaid": { "allocated": null, "used": 2.0, "remaining": null }
    }
}))]
pub struct LeaveBalanceResponse {
    pub employee_id: u64,
    pub year: i32,
    #[schema(value_type = Object)]
    pub balances: BTreeMap<LeaveType, LeaveBalance>,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveQuery {
    /// Filter by employee ID (HR/Admin only; others always see their own)
    pub employee_id: Option<u64>,
    /// Filter by leave status
    pub status: Option<LeaveStatus>,
    /// Filter by leave type
    pub leave_type: Option<LeaveType>,
    /// Applications ending on or after this day
    #[param(value_type = Option<String>, format = "date", example = "2024-01-01")]
    pub from: Option<NaiveDate>,
    /// Applications starting on or before this day
    #[param(value_type = Option<String>, format = "date", example = "2024-12-31")]
    pub to: Option<NaiveDate>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Pagination per page number
    pub per_page: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Calendar year, defaults to the current one
    pub year: Option<i32>,
    /// Another employee's balance (HR/Admin only)
    pub employee_id: Option<u64>,
}

async fn with_profile(
    directory: &dyn EmployeeDirectory,
    leave: LeaveApplication,
) -> Result<LeaveResponse, AppError> {
    let employee = directory.profile(leave.employee_id).await?;
    Ok(LeaveResponse { leave, employee })
}

/* =========================
Apply for leave
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveApplication),
        (status = 400, description = "Invalid range, half-day misuse or insufficient balance", body = Object, example = json!({
            "kind": "validation_error",
            "message": "Insufficient casual leave balance: requested 8 day(s), 7 remaining, short by 1 day(s)"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No employee profile"),
        (status = 409, description = "Overlaps an existing pending or approved leave")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    directory: web::Data<dyn EmployeeDirectory>,
    clock: web::Data<dyn Clock>,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = current_employee(&auth, directory.get_ref()).await?;
    let payload = payload.into_inner();

    let leave = ledger
        .apply(
            ApplyLeave {
                employee_id,
                leave_type: payload.leave_type,
                from_date: payload.from_date,
                to_date: payload.to_date,
                is_half_day: payload.is_half_day,
                half_day_session: payload.half_day_session,
                reason: payload.reason,
            },
            clock.now(),
        )
        .await?;

    Ok(HttpResponse::Created().json(leave))
}

/* =========================
Leave list
========================= */
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveQuery),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    directory: web::Data<dyn EmployeeDirectory>,
    query: web::Query<LeaveQuery>,
) -> actix_web::Result<HttpResponse> {
    let query = query.into_inner();

    let employee_id = if auth.role.is_hr_or_admin() {
        query.employee_id
    } else {
        let own = current_employee(&auth, directory.get_ref()).await?;
        auth.require_self_or_hr(Some(own), query.employee_id.unwrap_or(own))?;
        Some(own)
    };

    let filter = LeaveFilter {
        employee_id,
        status: query.status,
        leave_type: query.leave_type,
        from: query.from,
        to: query.to,
        pagination: Pagination::new(query.page, query.per_page),
    };
    let page = ledger.list(&filter).await?;

    let profiles = profiles_for(directory.get_ref(), page.data.iter().map(|l| l.employee_id)).await?;
    let page = page.map(|leave| LeaveResponse {
        employee: profiles.get(&leave.employee_id).cloned(),
        leave,
    });

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data: page.data,
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }))
}

/* =========================
Leave balance
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/balance",
    params(BalanceQuery),
    responses(
        (status = 200, description = "Allocated, used and remaining days per leave type", body = LeaveBalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_balance(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    directory: web::Data<dyn EmployeeDirectory>,
    clock: web::Data<dyn Clock>,
    query: web::Query<BalanceQuery>,
) -> actix_web::Result<HttpResponse> {
    let own = current_employee_opt(&auth, directory.get_ref()).await?;
    let employee_id = match (query.employee_id, own) {
        (Some(other), _) => {
            auth.require_self_or_hr(own, other)?;
            other
        }
        (None, Some(own)) => own,
        (None, None) => {
            return Err(AppError::not_found("No employee profile linked to this account").into());
        }
    };
    let year = query.year.unwrap_or_else(|| clock.now().year());

    let balances = ledger.balance(employee_id, year).await?;
    Ok(HttpResponse::Ok().json(LeaveBalanceResponse {
        employee_id,
        year,
        balances,
    }))
}

/* =========================
Single leave application
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "kind": "not_found",
            "message": "Leave application 42 not found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    directory: web::Data<dyn EmployeeDirectory>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let leave = ledger.get(path.into_inner()).await?;
    let own = current_employee_opt(&auth, directory.get_ref()).await?;
    auth.require_self_or_hr(own, leave.employee_id)?;

    Ok(HttpResponse::Ok().json(with_profile(directory.get_ref(), leave).await?))
}

/* =========================
Approve leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    request_body(
        content = ReviewRequest,
        description = "Optional decision note",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave approved", body = LeaveApplication),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave application already processed", body = Object, example = json!({
            "kind": "conflict",
            "message": "Leave application already processed"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    clock: web::Data<dyn Clock>,
    path: web::Path<u64>,
    payload: Option<web::Json<ReviewRequest>>,
) -> actix_web::Result<HttpResponse> {
    let note = payload.and_then(|p| p.into_inner().note);
    review(auth, ledger, clock, path, note, Decision::Approve).await
}

/* =========================
Reject leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body(content = ReviewRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveApplication),
        (status = 400, description = "Rejection reason missing or malformed body"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave application already processed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    clock: web::Data<dyn Clock>,
    path: web::Path<u64>,
    payload: web::Json<ReviewRequest>,
) -> actix_web::Result<HttpResponse> {
    review(auth, ledger, clock, path, payload.into_inner().note, Decision::Reject).await
}

async fn review(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    clock: web::Data<dyn Clock>,
    path: web::Path<u64>,
    note: Option<String>,
    decision: Decision,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let leave = ledger
        .review(path.into_inner(), decision, auth.user_id, note, clock.now())
        .await?;
    Ok(HttpResponse::Ok().json(leave))
}

/* =========================
Cancel own leave
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/cancel",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to cancel")
    ),
    responses(
        (status = 200, description = "Leave cancelled", body = LeaveApplication),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Leave request not found"),
        (status = 422, description = "Not the applicant, already started or already processed", body = Object, example = json!({
            "kind": "precondition_failed",
            "message": "Leave has already started"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    ledger: web::Data<LeaveLedger>,
    directory: web::Data<dyn EmployeeDirectory>,
    clock: web::Data<dyn Clock>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = current_employee(&auth, directory.get_ref()).await?;
    let leave = ledger
        .cancel(path.into_inner(), employee_id, clock.now())
        .await?;
    Ok(HttpResponse::Ok().json(leave))
}

#[cfg(test)]
mod tests {
    use actix_web::test;
    use serde_json::{Value, json};

    use crate::api::test_support::{bearer, test_app};
    use crate::service::attendance::tests::at;

    const EMPLOYEE: u8 = 3;
    const HR: u8 = 2;

    fn apply_body(from: &str, to: &str) -> Value {
        json!({ "leave_type": "casual", "from_date": from, "to_date": to, "reason": "trip" })
    }

    #[actix_web::test]
    async fn apply_review_and_balance_flow() {
        let app = test_app!(at(11, 10, 0), 10);

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(1, EMPLOYEE))
            .set_json(apply_body("2024-03-18", "2024-03-22"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let leave: Value = test::read_body_json(resp).await;
        assert_eq!(leave["status"], "pending");
        assert_eq!(leave["total_days"], 5.0);
        let id = leave["id"].as_u64().unwrap();

        // employees cannot review
        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/approve"))
            .insert_header(bearer(1, EMPLOYEE))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/approve"))
            .insert_header(bearer(2, HR))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "approved");
        assert_eq!(body["reviewed_by"], 2);

        let req = test::TestRequest::get()
            .uri("/api/leave/balance?year=2024")
            .insert_header(bearer(1, EMPLOYEE))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["employee_id"], 1000);
        assert_eq!(body["balances"]["casual"]["remaining"], 7.0);
        assert_eq!(body["balances"]["unpaid"]["allocated"], Value::Null);

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(1, EMPLOYEE))
            .set_json(apply_body("2024-04-01", "2024-04-08"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "validation_error");

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(1, EMPLOYEE))
            .set_json(apply_body("2024-03-22", "2024-03-25"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);
    }

    #[actix_web::test]
    async fn reject_requires_a_note() {
        let app = test_app!(at(11, 10, 0), 10);

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(1, EMPLOYEE))
            .set_json(apply_body("2024-03-18", "2024-03-18"))
            .to_request();
        let leave: Value = test::call_and_read_body_json(&app, req).await;
        let id = leave["id"].as_u64().unwrap();

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/reject"))
            .insert_header(bearer(2, HR))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/reject"))
            .insert_header(bearer(2, HR))
            .set_json(json!({ "note": "   " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "validation_error");

        // a body that does not parse is reported as such, not as a missing note
        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/reject"))
            .insert_header(bearer(2, HR))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"note\": 42")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().starts_with("Invalid JSON body"));

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/reject"))
            .insert_header(bearer(2, HR))
            .set_json(json!({ "note": "quarter close" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["decision_note"], "quarter close");
    }

    #[actix_web::test]
    async fn owner_cancels_and_others_cannot_read() {
        let app = test_app!(at(11, 10, 0), 10);

        let req = test::TestRequest::post()
            .uri("/api/leave")
            .insert_header(bearer(1, EMPLOYEE))
            .set_json(apply_body("2024-03-12", "2024-03-12"))
            .to_request();
        let leave: Value = test::call_and_read_body_json(&app, req).await;
        let id = leave["id"].as_u64().unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/leave/{id}"))
            .insert_header(bearer(2, EMPLOYEE))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri(&format!("/api/leave/{id}"))
            .insert_header(bearer(1, EMPLOYEE))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["employee"]["id"], 1000);

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/cancel"))
            .insert_header(bearer(2, EMPLOYEE))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 422);

        let req = test::TestRequest::put()
            .uri(&format!("/api/leave/{id}/cancel"))
            .insert_header(bearer(1, EMPLOYEE))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "cancelled");

        let req = test::TestRequest::get()
            .uri("/api/leave?status=cancelled")
            .insert_header(bearer(1, EMPLOYEE))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["employee"]["employee_code"], "EMP-1000");
    }

    #[actix_web::test]
    async fn out_of_range_page_returns_an_empty_page() {
        let app = test_app!(at(11, 10, 0), 10);
        let req = test::TestRequest::get()
            .uri("/api/leave?page=18446744073709551615&per_page=100")
            .insert_header(bearer(2, HR))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    }
}
