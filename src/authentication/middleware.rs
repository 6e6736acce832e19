use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use super::jwt::{verify_jwt_session, SessionData};
use crate::{
    config::JwtConfig,
    error::{Error, ErrorKind},
};

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if !(scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token"))
        || token.is_empty()
    {
        return None;
    }
    Some(token)
}

pub fn session_from_header(header: Option<&str>, config: &JwtConfig) -> Result<SessionData, Error> {
    let header = header.ok_or_else(|| ErrorKind::Unauthorized.default())?;
    let token = bearer_token(header)
        .ok_or_else(|| ErrorKind::Unauthorized.new("Invalid session; Malformed authorization header"))?;

    verify_jwt_session(token, config).map(SessionData::from)
}

/// Rejects the request unless it carries a valid `Authorization: Bearer` token.
pub fn with_session(
    config: Arc<JwtConfig>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let config = config.clone();
        async move {
            session_from_header(header.as_deref(), &config).map_err(|e| {
                log::debug!("rejected session: {e}");
                warp::reject::custom(e)
            })
        }
    })
}

/// Anonymous callers pass through as `None`.
pub fn with_possible_session(
    config: Arc<JwtConfig>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(move |header: Option<String>| {
        session_from_header(header.as_deref(), &config).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{jwt::generate_jwt_session, schema::User, schema::UserRole};

    fn config() -> Arc<JwtConfig> {
        Arc::new(JwtConfig {
            secret: String::from("middleware-secret"),
            expiry_hours: 1,
        })
    }

    fn token() -> String {
        let user = User {
            id: 5,
            email: String::from("a@b.co"),
            username: String::from("baker"),
            first_name: String::from("A"),
            last_name: String::from("B"),
            password: String::new(),
            avatar: None,
            role: UserRole::User,
        };
        generate_jwt_session(&user, &config()).unwrap()
    }

    #[test]
    fn parses_bearer_and_token_schemes() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Token abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn session_filter_extracts_caller() {
        let session = warp::test::request()
            .header("authorization", format!("Bearer {}", token()))
            .filter(&with_session(config()))
            .await
            .unwrap();

        assert_eq!(session.user_id, 5);
        assert_eq!(session.username, "baker");
    }

    #[tokio::test]
    async fn session_filter_rejects_missing_header() {
        let result = warp::test::request()
            .filter(&with_session(config()))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn possible_session_is_none_for_anonymous_callers() {
        let anonymous = warp::test::request()
            .filter(&with_possible_session(config()))
            .await
            .unwrap();
        let garbage = warp::test::request()
            .header("authorization", "Bearer not-a-jwt")
            .filter(&with_possible_session(config()))
            .await
            .unwrap();

        assert!(anonymous.is_none());
        assert!(garbage.is_none());
    }
}
