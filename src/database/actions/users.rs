use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::SessionData,
        permissions::ActionType,
    },
    database::{
        error::QueryError,
        form::Form,
        pagination::{PageContext, PageRequest},
        representation::UserRead,
        schema::{Id, User, UserRow},
        validation::{validate_password, validate_user, ValidationErrors},
    },
    error::{Error, ErrorKind},
};

use super::subscriptions::is_subscribed;
use sqlx::{Pool, Postgres};

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(pool: &Pool<Postgres>, email: &str) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Like [`get_user_by_id`], but a missing user is a 404.
pub async fn get_user_mut(pool: &Pool<Postgres>, user_id: Id) -> Result<User, Error> {
    get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("User not found"))
}

/// Creates a user from a signup form. The password is stored as an argon2 hash.
pub async fn register_user(form: &Form, pool: &Pool<Postgres>) -> Result<UserRead, Error> {
    let input = validate_user(form)?;

    let mut errors = ValidationErrors::new();
    let taken: Vec<(String, String)> =
        sqlx::query_as("SELECT email, username FROM users WHERE email = $1 OR username = $2")
            .bind(&input.email)
            .bind(&input.username)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;
    for (email, username) in taken {
        if email == input.email {
            errors.add("email", "A user with this email address already exists");
        }
        if username == input.username {
            errors.add("username", "A user with this username already exists");
        }
    }
    errors.into_result(())?;

    let password = hash_password(&input.password)
        .map_err(|_e| ErrorKind::InternalServerError.new("Failed to hash password"))?;

    let user: Option<User> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING *;
    ",
    )
    .bind(&input.email)
    .bind(&input.username)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    match user {
        Some(user) => {
            log::info!("registered user {} ({})", user.id, user.username);
            Ok(UserRead::from_user(&user, false))
        }
        None => Err(ErrorKind::Conflict.new("A user with these credentials already exists")),
    }
}

pub async fn get_user_profile(
    user_id: Id,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<UserRead, Error> {
    let user = get_user_mut(pool, user_id).await?;
    let subscribed = match viewer {
        Some(viewer) => is_subscribed(viewer.user_id, user.id, pool).await?,
        None => false,
    };

    Ok(UserRead::from_user(&user, subscribed))
}

pub async fn get_current_user(session: &SessionData, pool: &Pool<Postgres>) -> Result<UserRead, Error> {
    let user = get_user_mut(pool, session.user_id).await?;
    Ok(UserRead::from_user(&user, false))
}

pub async fn list_users(
    viewer: Option<&SessionData>,
    request: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserRead>, Error> {
    let rows: Vec<UserRow> =
        sqlx::query_as("SELECT *, COUNT(*) OVER() AS count FROM users ORDER BY id LIMIT $1 OFFSET $2")
            .bind(request.limit)
            .bind(request.offset())
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        let subscribed = match viewer {
            Some(viewer) => is_subscribed(viewer.user_id, row.user.id, pool).await?,
            None => false,
        };
        users.push(UserRead::from_user(&row.user, subscribed));
    }

    PageContext::try_from_rows(users, total_count, request)
}

pub async fn set_avatar(
    session: &SessionData,
    avatar: &str,
    pool: &Pool<Postgres>,
) -> Result<UserRead, Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;
    if avatar.trim().is_empty() {
        return Err(ValidationErrors::single("avatar", "This field may not be blank").into());
    }

    let user: Option<User> = sqlx::query_as("UPDATE users SET avatar = $1 WHERE id = $2 RETURNING *")
        .bind(avatar)
        .bind(session.user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    let user = user.ok_or_else(|| ErrorKind::NotFound.new("User not found"))?;
    Ok(UserRead::from_user(&user, false))
}

pub async fn clear_avatar(session: &SessionData, pool: &Pool<Postgres>) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;

    sqlx::query("UPDATE users SET avatar = NULL WHERE id = $1")
        .bind(session.user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

pub async fn set_password(
    session: &SessionData,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnProfile)?;
    let user = get_user_mut(pool, session.user_id).await?;

    let authenticated = verify_password(current_password, &user.password)
        .map_err(|_e| ErrorKind::InternalServerError.new("Stored password hash is unreadable"))?;
    if !authenticated {
        return Err(ValidationErrors::single("current_password", "Invalid password").into());
    }
    validate_password("new_password", new_password)?;

    let password = hash_password(new_password)
        .map_err(|_e| ErrorKind::InternalServerError.new("Failed to hash password"))?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    log::info!("user {} changed their password", user.id);
    Ok(())
}
