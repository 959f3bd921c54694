use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

use crate::auth::auth::authenticate;
use crate::config::Config;

/// Rejects requests without a valid access token and stores the resolved
/// `AuthUser` in request extensions for the handlers.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    match authenticate(req.headers(), &config.jwt_secret) {
        Ok(user) => {
            tracing::debug!(user_id = user.user_id, role = ?user.role, "Authenticated");
            req.extensions_mut().insert(user);
            next.call(req).await
        }
        Err(failure) => {
            tracing::debug!(%failure, path = req.path(), "Rejected unauthenticated request");
            let resp = HttpResponse::Unauthorized().json(json!({
                "kind": "unauthorized",
                "message": failure.to_string()
            }));
            Ok(req.into_response(resp.map_into_boxed_body()))
        }
    }
}
