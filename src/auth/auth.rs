use actix_web::{
    FromRequest, HttpMessage, HttpRequest, dev::Payload, error::ErrorUnauthorized,
    http::header::HeaderMap, web::Data,
};
use futures::future::{Ready, ready};
use thiserror::Error;

use crate::auth::jwt::{TokenRejection, verify_access_token};
use crate::config::Config;
use crate::model::role::Role;

/// Authenticated principal of the current request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

/// Why a request could not be authenticated; the text is sent to the client.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Authorization header must start with Bearer")]
    NotBearer,
    #[error("Invalid or expired token: {0}")]
    InvalidToken(#[from] TokenRejection),
    #[error("Invalid role {0}")]
    UnknownRole(u8),
}

/// Resolves the bearer token in `headers` to an [`AuthUser`].
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthUser, AuthFailure> {
    let value = headers
        .get("Authorization")
        .ok_or(AuthFailure::MissingHeader)?
        .to_str()
        .map_err(|_| AuthFailure::NotBearer)?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthFailure::NotBearer)?;

    let claims = verify_access_token(token, secret)?;
    let role = Role::try_from(claims.role).map_err(AuthFailure::UnknownRole)?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
    })
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let Some(config) = req.app_data::<Data<Config>>() else {
            return ready(Err(actix_web::error::ErrorInternalServerError(
                "Config missing",
            )));
        };

        ready(authenticate(req.headers(), &config.jwt_secret).map_err(|e| ErrorUnauthorized(e.to_string())))
    }
}

impl AuthUser {
    pub fn require_hr_or_admin(&self) -> actix_web::Result<()> {
        if self.role.is_hr_or_admin() {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("HR/Admin only"))
        }
    }

    /// Allows access to `owner`'s data for the owner itself or HR/Admin.
    pub fn require_self_or_hr(&self, own_employee_id: Option<u64>, owner: u64) -> actix_web::Result<()> {
        if own_employee_id == Some(owner) || self.role.is_hr_or_admin() {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Not allowed to view another employee's data"))
        }
    }
}
