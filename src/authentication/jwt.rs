use chrono::Duration;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::config::JwtConfig;
use crate::error::{Error, ErrorKind};
use crate::schema::{Id, User, UserRole};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(ErrorKind::Forbidden.default());
        }
        Ok(())
    }

    /// Owners may touch their own rows; `elevated` lets privileged roles through too.
    pub fn authenticate_owner(&self, owner_id: Id, elevated: ActionType) -> Result<(), Error> {
        if owner_id == self.user_id || elevated.authenticate(self) {
            return Ok(());
        }
        Err(ErrorKind::Forbidden.default())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            role: value.role,
        }
    }
}

fn signing_key(config: &JwtConfig) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(config.secret.as_bytes())
        .map_err(|_| ErrorKind::InternalServerError.new("Invalid session signing key"))
}

pub fn generate_jwt_session(user: &User, config: &JwtConfig) -> Result<String, Error> {
    let key = signing_key(config)?;
    let claims = JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role,
        Duration::hours(config.expiry_hours),
    );

    claims
        .sign_with_key(&key)
        .map_err(|_| ErrorKind::InternalServerError.new("Failed to sign session"))
}

pub fn verify_jwt_session(token: &str, config: &JwtConfig) -> Result<JwtSessionData, Error> {
    let key = signing_key(config)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| ErrorKind::Unauthorized.new("Invalid session; Invalid token"))?;

    if session.is_expired() {
        return Err(ErrorKind::Unauthorized.new("Invalid session; Token expired"));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: String::from("test-secret"),
            expiry_hours: 1,
        }
    }

    fn user() -> User {
        User {
            id: 42,
            email: String::from("cook@example.org"),
            username: String::from("cook"),
            first_name: String::from("Julia"),
            last_name: String::from("Child"),
            password: String::new(),
            avatar: None,
            role: UserRole::User,
        }
    }

    #[test]
    fn token_round_trips() {
        let token = generate_jwt_session(&user(), &config()).unwrap();
        let session: SessionData = verify_jwt_session(&token, &config()).unwrap().into();

        assert_eq!(session.user_id, 42);
        assert_eq!(session.username, "cook");
        assert_eq!(session.role, UserRole::User);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = generate_jwt_session(&user(), &config()).unwrap();
        let other = JwtConfig {
            secret: String::from("another-secret"),
            expiry_hours: 1,
        };

        let error = verify_jwt_session(&token, &other).unwrap_err();
        assert_eq!(error.code, 401);
    }

    #[test]
    fn expired_token_is_rejected() {
        let expired = JwtConfig {
            secret: String::from("test-secret"),
            expiry_hours: -1,
        };
        let token = generate_jwt_session(&user(), &expired).unwrap();

        let error = verify_jwt_session(&token, &config()).unwrap_err();
        assert_eq!(error.info.as_deref(), Some("Invalid session; Token expired"));
    }

    #[test]
    fn owners_and_admins_pass_ownership_checks() {
        let session = SessionData {
            user_id: 1,
            username: String::from("cook"),
            role: UserRole::User,
        };
        let admin = SessionData {
            role: UserRole::Admin,
            ..session.clone()
        };

        assert!(session
            .authenticate_owner(1, ActionType::ManageAllRecipes)
            .is_ok());
        assert_eq!(
            session
                .authenticate_owner(2, ActionType::ManageAllRecipes)
                .unwrap_err()
                .code,
            403
        );
        assert!(admin.authenticate_owner(2, ActionType::ManageAllRecipes).is_ok());
    }
}
