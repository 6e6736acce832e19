use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{
        error::QueryError,
        pagination::{PageContext, PageRequest},
        representation::{ShortRecipe, SubscriptionRead, UserRead},
        schema::{Id, User, UserRow},
        validation::validate_subscription,
    },
    error::Error,
};

use super::{conflict_unless_changed, users::get_user_mut};
use sqlx::{Pool, Postgres};

pub async fn is_subscribed(
    follower_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: Option<(Id,)> =
        sqlx::query_as("SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = $2")
            .bind(follower_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row.is_some())
}

/// Author card shown in subscription listings: the author, their newest
/// recipes (at most `recipes_limit`, all when `None`) and their recipe count.
pub async fn subscription_read(
    author: &User,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionRead, Error> {
    let recipes: Vec<ShortRecipe> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time FROM recipes
        WHERE author_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
    ",
    )
    .bind(author.id)
    .bind(recipes_limit.map(|limit| limit.max(0)))
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let (recipes_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author.id)
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(SubscriptionRead {
        author: UserRead::from_user(author, true),
        recipes,
        recipes_count,
    })
}

pub async fn subscribe(
    session: &SessionData,
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionRead, Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    validate_subscription(session.user_id, author_id)?;
    let author = get_user_mut(pool, author_id).await?;

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author.id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    conflict_unless_changed(result.rows_affected(), "You are already subscribed to this user")?;

    log::info!("user {} subscribed to {}", session.user_id, author.id);
    subscription_read(&author, recipes_limit, pool).await
}

pub async fn unsubscribe(
    session: &SessionData,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let author = get_user_mut(pool, author_id).await?;

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    conflict_unless_changed(result.rows_affected(), "You were not subscribed to this user")?;

    log::info!("user {} unsubscribed from {}", session.user_id, author.id);
    Ok(())
}

pub async fn list_subscriptions(
    session: &SessionData,
    recipes_limit: Option<i64>,
    request: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscriptionRead>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.*, COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(subscription_read(&row.user, recipes_limit, pool).await?);
    }

    PageContext::try_from_rows(results, total_count, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, schema::UserRole};
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Pool<Postgres> {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://localhost/foodgram")
            .unwrap()
    }

    #[tokio::test]
    async fn self_subscription_is_rejected_before_any_query() {
        let session = SessionData {
            user_id: 7,
            username: String::from("cook"),
            role: UserRole::User,
        };

        let err = subscribe(&session, 7, None, &lazy_pool()).await.unwrap_err();

        assert!(err.is(ErrorKind::InvalidRequest));
        let fields = err.fields.unwrap();
        assert_eq!(fields["author"], vec![String::from("You cannot subscribe to yourself")]);
    }
}
