use std::collections::HashMap;

use actix_web::{HttpResponse, error::JsonPayloadError, web};
use serde_json::json;

use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::employee::EmployeeProfile;
use crate::store::EmployeeDirectory;

pub mod attendance;
pub mod leave_request;

/// Employee id of the authenticated principal.
pub async fn current_employee(
    auth: &AuthUser,
    directory: &dyn EmployeeDirectory,
) -> Result<u64, AppError> {
    directory
        .resolve(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("No employee profile linked to this account"))
}

/// Like [`current_employee`] but `None` for principals without a profile
/// (HR or admin accounts may have none).
pub async fn current_employee_opt(
    auth: &AuthUser,
    directory: &dyn EmployeeDirectory,
) -> Result<Option<u64>, AppError> {
    Ok(directory.resolve(auth.user_id).await?)
}

/// Looks up each distinct employee once.
pub async fn profiles_for(
    directory: &dyn EmployeeDirectory,
    ids: impl IntoIterator<Item = u64>,
) -> Result<HashMap<u64, EmployeeProfile>, AppError> {
    let mut profiles = HashMap::new();
    for id in ids {
        if profiles.contains_key(&id) {
            continue;
        }
        if let Some(profile) = directory.profile(id).await? {
            profiles.insert(id, profile);
        }
    }
    Ok(profiles)
}

/// Room for the `data:` prefix, location and source next to the evidence.
const JSON_SLACK_BYTES: usize = 64 * 1024;

/// JSON body limit large enough for base64 evidence up to
/// `evidence_max_bytes`. Body errors answer as validation failures.
pub fn json_config(evidence_max_bytes: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(evidence_max_bytes.div_ceil(3) * 4 + JSON_SLACK_BYTES)
        .error_handler(move |err, _req| {
            let message = match &err {
                JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
                    format!("Request body too large: evidence may be at most {evidence_max_bytes} bytes")
                }
                other => format!("Invalid JSON body: {other}"),
            };
            AppError::validation(message).into()
        })
}

pub fn too_many_requests() -> HttpResponse {
    HttpResponse::TooManyRequests().json(json!({
        "kind": "rate_limited",
        "message": "Too many attendance requests, slow down"
    }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::jwt::tests::{SECRET, access_token};
    use crate::config::{Config, EvidenceBackend};
    use crate::service::policy::{LeavePolicy, OfficePolicy};

    pub fn test_config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            database_url: None,
            jwt_secret: SECRET.into(),
            api_prefix: "/api".into(),
            log_level: tracing::Level::DEBUG,
            rate_protected_per_min: 1000,
            rate_attendance_per_min: 10,
            office: OfficePolicy::default(),
            leave: LeavePolicy::default(),
            evidence: EvidenceBackend::Local {
                dir: "evidence".into(),
                public_url: "/evidence".into(),
            },
            evidence_max_bytes: 1024,
            auto_stop_sweep_secs: 0,
        }
    }

    pub fn bearer(user_id: u64, role: u8) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", access_token(user_id, role)))
    }

    /// Protected API over the seeded in-memory store, at a fixed `now`, with
    /// `limit` attendance calls per employee and an evidence cap of
    /// `max_bytes` (1 KiB unless given).
    macro_rules! test_app {
        ($now:expr, $limit:expr) => {
            test_app!($now, $limit, 1024)
        };
        ($now:expr, $limit:expr, $max_bytes:expr) => {{
            use std::sync::Arc;
            use actix_web::{App, middleware::from_fn, web::Data};

            let store = Arc::new($crate::store::memory::MemoryStore::seeded_for_development());
            let service = $crate::service::attendance::AttendanceService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                Arc::new($crate::service::attendance::tests::RecordingEvidence::default()),
                $crate::service::policy::OfficePolicy::default(),
                $max_bytes,
            );
            let ledger = $crate::service::leave::LeaveLedger::new(
                store.clone(),
                $crate::service::policy::LeavePolicy::default(),
            );
            let directory: Arc<dyn $crate::store::EmployeeDirectory> = store.clone();
            let limiter: Arc<dyn $crate::utils::rate_limiter::RateLimiter> = Arc::new(
                $crate::utils::rate_limiter::WindowedRateLimiter::per_minute($limit),
            );
            let clock: Arc<dyn $crate::utils::clock::Clock> =
                Arc::new($crate::utils::clock::FixedClock($now));

            actix_web::test::init_service(
                App::new()
                    .app_data(Data::new($crate::api::test_support::test_config()))
                    .app_data($crate::api::json_config($max_bytes))
                    .app_data(Data::new(service))
                    .app_data(Data::new(ledger))
                    .app_data(Data::from(directory))
                    .app_data(Data::from(limiter))
                    .app_data(Data::from(clock))
                    .service(
                        actix_web::web::scope("/api")
                            .wrap(from_fn($crate::auth::middleware::auth_middleware))
                            .configure($crate::routes::register),
                    ),
            )
            .await
        }};
    }
    pub(crate) use test_app;
}
