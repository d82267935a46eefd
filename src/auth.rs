use argon2::Argon2;
use axum::{
    extract::{FromRequest, RequestParts},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    TypedHeader,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use jsonwebtoken::{
    errors::Result as JwtResult, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use password_hash::{
    self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use serde::{Deserialize, Serialize};
use std::{ops::Deref, time::Duration};

use crate::{
    error::{AppError, WorkflowError},
    models::{Capability, User},
    schema::users,
};

pub fn hash_password(password: impl AsRef<[u8]>) -> password_hash::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_ref(), &salt)
        .map(|h| h.to_string())
}

pub fn verify_password(
    password: impl AsRef<[u8]>,
    password_hash: impl AsRef<str>,
) -> password_hash::Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash.as_ref())?;
    Ok(Argon2::default()
        .verify_password(password.as_ref(), &parsed_hash)
        .is_ok())
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

lazy_static::lazy_static! {
    // TODO: use jwt_secret from config instead of env var
    static ref KEYS: Keys = {
        let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
        Keys {
            encoding: EncodingKey::from_base64_secret(&secret).expect("JWT_SECRET is not valid base64"),
            decoding: DecodingKey::from_base64_secret(&secret).expect("JWT_SECRET is not valid base64"),
        }
    };
}

/// The token carries only the identity. The capability class is re-read from
/// the store on every request so an approval-driven elevation is visible
/// without reissuing the token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub exp: u64,
}

#[allow(unused_must_use)]
pub fn ensure_jwt_secret_is_valid() {
    KEYS.deref();
}

pub fn generate_jwt(user_id: i32, exp: Duration) -> JwtResult<String> {
    jsonwebtoken::encode(
        &Header::default(),
        &Claims {
            user_id,
            exp: jsonwebtoken::get_current_timestamp() + exp.as_secs(),
        },
        &KEYS.encoding,
    )
}

pub fn validate_jwt(token: &str) -> JwtResult<TokenData<Claims>> {
    jsonwebtoken::decode::<Claims>(token, &KEYS.decoding, &Validation::default())
}

/// Authenticated caller identity, threaded explicitly into every workflow
/// operation. Guests simply have no context.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: i32,
    pub capability: Capability,
}

impl AuthContext {
    pub fn new(user_id: i32, capability: Capability) -> AuthContext {
        AuthContext {
            user_id,
            capability,
        }
    }

    pub async fn load(
        conn: &mut AsyncPgConnection,
        user_id: i32,
    ) -> Result<AuthContext, WorkflowError> {
        let user = users::table
            .find(user_id)
            .first::<User>(conn)
            .await
            .optional()?
            .ok_or(WorkflowError::Unauthorized)?;
        Ok(AuthContext::new(user.id, user.capability()))
    }

    /// True iff the caller may act as a reviewer for the given club.
    pub fn can_review(&self, club_id: i32) -> bool {
        match self.capability {
            Capability::Admin => true,
            Capability::ClubAdmin(club) | Capability::ClubLeader(club) => club == club_id,
            Capability::Student => false,
        }
    }

    pub fn require_admin(&self) -> Result<(), WorkflowError> {
        match self.capability {
            Capability::Admin => Ok(()),
            _ => Err(WorkflowError::Unauthorized),
        }
    }
}

/// Bearer-token extractor; yields the authenticated user id.
pub struct ExtractAuth(pub i32);

#[axum::async_trait]
impl<B: Send> FromRequest<B> for ExtractAuth {
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request(req)
                .await
                .map_err(|_| {
                    AppError::from(StatusCode::UNAUTHORIZED, "missing bearer token")
                })?;

        let token = validate_jwt(bearer.token())
            .map_err(|_| AppError::from(StatusCode::UNAUTHORIZED, "invalid or expired token"))?;

        Ok(ExtractAuth(token.claims.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn jwt_round_trips() {
        // base64 of a throwaway test secret
        std::env::set_var("JWT_SECRET", "c2VjcmV0LXNlY3JldC1zZWNyZXQ=");
        let token = generate_jwt(42, Duration::from_secs(60)).unwrap();
        let data = validate_jwt(&token).unwrap();
        assert_eq!(data.claims.user_id, 42);
    }

    #[test]
    fn review_rights_are_scoped_to_the_home_club() {
        let admin = AuthContext::new(1, Capability::Admin);
        let leader = AuthContext::new(2, Capability::ClubLeader(7));
        let club_admin = AuthContext::new(3, Capability::ClubAdmin(7));
        let student = AuthContext::new(4, Capability::Student);

        assert!(admin.can_review(7));
        assert!(admin.can_review(8));
        assert!(leader.can_review(7));
        assert!(!leader.can_review(8));
        assert!(club_admin.can_review(7));
        assert!(!club_admin.can_review(8));
        assert!(!student.can_review(7));

        assert!(admin.require_admin().is_ok());
        assert!(leader.require_admin().is_err());
    }
}
