use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use crate::models::{Claims, TokenType};

#[derive(Debug, Error)]
pub enum TokenRejection {
    #[error("{0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    /// A refresh token presented where an access token is expected.
    #[error("refresh token cannot be used here")]
    WrongType,
}

/// Verifies signature and expiry and accepts access tokens only.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, TokenRejection> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?
    .claims;

    if claims.token_type != TokenType::Access {
        return Err(TokenRejection::WrongType);
    }
    Ok(claims)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    use super::*;

    pub const SECRET: &str = "test-secret";

    pub fn token(user_id: u64, role: u8, token_type: TokenType, ttl: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = Claims {
            user_id,
            sub: format!("user{user_id}"),
            role,
            exp: (now + ttl) as usize,
            jti: Uuid::new_v4().to_string(),
            token_type,
            employee_id: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    pub fn access_token(user_id: u64, role: u8) -> String {
        token(user_id, role, TokenType::Access, 900)
    }

    #[test]
    fn accepts_valid_access_token() {
        let claims = verify_access_token(&access_token(7, 3), SECRET).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.role, 3);
    }

    #[test]
    fn rejects_refresh_expired_and_foreign_tokens() {
        let refresh = token(7, 3, TokenType::Refresh, 900);
        assert!(matches!(
            verify_access_token(&refresh, SECRET),
            Err(TokenRejection::WrongType)
        ));

        // beyond the default 60s leeway
        let expired = token(7, 3, TokenType::Access, -600);
        assert!(matches!(
            verify_access_token(&expired, SECRET),
            Err(TokenRejection::Invalid(_))
        ));

        assert!(verify_access_token(&access_token(7, 3), "other-secret").is_err());
    }
}
