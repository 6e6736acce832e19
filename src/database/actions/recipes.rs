use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::{SHORT_LINK_ATTEMPTS, SHORT_LINK_LENGTH},
    database::{
        error::QueryError,
        form::Form,
        pagination::{PageContext, PageRequest},
        representation::{RecipeFlags, RecipeRead, UserRead},
        schema::{Id, Recipe, RecipePart, RecipeRow, RecipeShortLink},
        validation::{validate_recipe, RecipeInput, ValidationErrors},
    },
    error::{Error, ErrorKind},
};

use super::{
    ingredients::missing_ingredients,
    lists::{is_favorite, is_in_shopping_cart},
    subscriptions::is_subscribed,
    tags::{list_recipe_tags, missing_tags},
    users::get_user_mut,
};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

/// Listing filters. Favorite and cart filters only apply to signed-in
/// viewers, and only when set to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

pub async fn list_recipe_parts(
    pool: &Pool<Postgres>,
    recipe_id: Id,
) -> Result<Vec<RecipePart>, Error> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS ingredient_id, i.name AS name,
               i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY ri.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

async fn find_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe the session is allowed to modify: its author, or anyone
/// allowed to manage all recipes.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = find_recipe(id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Recipe not found"))?;

    session.authenticate_owner(recipe.author_id, ActionType::ManageAllRecipes)?;
    Ok(recipe)
}

async fn recipe_read(
    recipe: Recipe,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<RecipeRead, Error> {
    let author = get_user_mut(pool, recipe.author_id).await?;
    let tags = list_recipe_tags(pool, recipe.id).await?;
    let parts = list_recipe_parts(pool, recipe.id).await?;

    let (subscribed, flags) = match viewer {
        Some(viewer) => (
            is_subscribed(viewer.user_id, author.id, pool).await?,
            RecipeFlags {
                is_favorited: is_favorite(recipe.id, viewer.user_id, pool).await?,
                is_in_shopping_cart: is_in_shopping_cart(recipe.id, viewer.user_id, pool).await?,
            },
        ),
        None => (false, RecipeFlags::default()),
    };

    Ok(RecipeRead::new(
        recipe,
        UserRead::from_user(&author, subscribed),
        tags,
        parts,
        flags,
    ))
}

async fn ensure_references(input: &RecipeInput, pool: &Pool<Postgres>) -> Result<(), Error> {
    let mut errors = ValidationErrors::new();

    for id in missing_tags(&input.tags, pool).await? {
        errors.add("tags", &format!("Tag {id} does not exist"));
    }
    let ingredient_ids: Vec<Id> = input.ingredients.iter().map(|i| i.id).collect();
    for id in missing_ingredients(&ingredient_ids, pool).await? {
        errors.add("ingredients", &format!("Ingredient {id} does not exist"));
    }

    errors.into_result(())?;
    Ok(())
}

/// Drops every tag link and ingredient row of a recipe and writes the ones
/// from `input`.
async fn replace_recipe_links(
    recipe_id: Id,
    input: &RecipeInput,
    conn: &mut PgConnection,
) -> Result<(), QueryError> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    if !input.tags.is_empty() {
        let mut tags = QueryBuilder::<Postgres>::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
        tags.push_values(&input.tags, |mut row, tag_id| {
            row.push_bind(recipe_id).push_bind(*tag_id);
        });
        tags.build().execute(&mut *conn).await?;
    }

    if !input.ingredients.is_empty() {
        let mut parts = QueryBuilder::<Postgres>::new(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
        );
        parts.push_values(&input.ingredients, |mut row, part| {
            row.push_bind(recipe_id)
                .push_bind(part.id)
                .push_bind(part.amount);
        });
        parts.build().execute(&mut *conn).await?;
    }

    Ok(())
}

pub async fn create_recipe(
    session: &SessionData,
    form: &Form,
    pool: &Pool<Postgres>,
) -> Result<RecipeRead, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let input = validate_recipe(form)?;
    ensure_references(&input, pool).await?;

    let mut tx = pool.begin().await.map_err(QueryError::from)?;
    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(session.user_id)
    .bind(&input.name)
    .bind(&input.text)
    .bind(&input.image)
    .bind(input.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    replace_recipe_links(recipe.id, &input, &mut tx).await?;
    tx.commit().await.map_err(QueryError::from)?;

    log::info!("user {} created recipe {}", session.user_id, recipe.id);
    recipe_read(recipe, Some(session), pool).await
}

/// Full update: every field is rewritten and tags and ingredients are replaced.
pub async fn update_recipe(
    id: Id,
    session: &SessionData,
    form: &Form,
    pool: &Pool<Postgres>,
) -> Result<RecipeRead, Error> {
    let recipe = get_recipe_mut(id, session, pool).await?;
    let input = validate_recipe(form)?;
    ensure_references(&input, pool).await?;

    let mut tx = pool.begin().await.map_err(QueryError::from)?;
    let recipe: Recipe = sqlx::query_as(
        "
        UPDATE recipes SET name = $1, text = $2, image = $3, cooking_time = $4
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(&input.name)
    .bind(&input.text)
    .bind(&input.image)
    .bind(input.cooking_time)
    .bind(recipe.id)
    .fetch_one(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    replace_recipe_links(recipe.id, &input, &mut tx).await?;
    tx.commit().await.map_err(QueryError::from)?;

    log::info!("user {} updated recipe {}", session.user_id, recipe.id);
    recipe_read(recipe, Some(session), pool).await
}

pub async fn delete_recipe(id: Id, session: &SessionData, pool: &Pool<Postgres>) -> Result<(), Error> {
    let recipe = get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    log::info!("user {} deleted recipe {}", session.user_id, recipe.id);
    Ok(())
}

pub async fn get_recipe(
    id: Id,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<RecipeRead, Error> {
    let recipe = find_recipe(id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Recipe not found"))?;

    recipe_read(recipe, viewer, pool).await
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<&SessionData>,
    request: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRead>, Error> {
    let mut query =
        QueryBuilder::<Postgres>::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if let Some(viewer) = viewer {
        if filter.is_favorited == Some(true) {
            query
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer.user_id)
                .push(")");
        }
        if filter.is_in_shopping_cart == Some(true) {
            query
                .push(
                    " AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ",
                )
                .push_bind(viewer.user_id)
                .push(")");
        }
    }
    query
        .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
        .push_bind(request.limit)
        .push(" OFFSET ")
        .push_bind(request.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(recipe_read(row.recipe, viewer, pool).await?);
    }

    PageContext::try_from_rows(results, total_count, request)
}

fn generate_short_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_LINK_LENGTH)
        .map(char::from)
        .collect()
}

async fn find_short_link(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeShortLink>, Error> {
    let link: Option<RecipeShortLink> =
        sqlx::query_as("SELECT * FROM recipe_short_links WHERE recipe_id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(link)
}

/// Returns the short link of a recipe, creating one on first use.
pub async fn get_short_link(recipe_id: Id, pool: &Pool<Postgres>) -> Result<RecipeShortLink, Error> {
    if let Some(link) = find_short_link(recipe_id, pool).await? {
        return Ok(link);
    }
    let recipe = find_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.new("Recipe not found"))?;

    for _ in 0..SHORT_LINK_ATTEMPTS {
        let code = generate_short_code();
        let link: Option<RecipeShortLink> = sqlx::query_as(
            "INSERT INTO recipe_short_links (recipe_id, code) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING *",
        )
        .bind(recipe.id)
        .bind(&code)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

        if let Some(link) = link {
            return Ok(link);
        }
        // Either the code is taken or a concurrent request linked the recipe.
        if let Some(link) = find_short_link(recipe.id, pool).await? {
            return Ok(link);
        }
        log::debug!("short code {code} already taken, retrying");
    }

    Err(ErrorKind::InternalServerError.new("Failed to allocate a short link"))
}

pub async fn resolve_short_link(code: &str, pool: &Pool<Postgres>) -> Result<Id, Error> {
    let row: Option<(Id,)> =
        sqlx::query_as("SELECT recipe_id FROM recipe_short_links WHERE code = $1")
            .bind(code)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    row.map(|(id,)| id)
        .ok_or_else(|| ErrorKind::NotFound.new("Short link not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_codes_are_alphanumeric() {
        let code = generate_short_code();
        assert_eq!(code.len(), SHORT_LINK_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn default_filter_matches_everything() {
        let filter = RecipeFilter::default();
        assert!(filter.author.is_none());
        assert!(filter.tags.is_empty());
        assert!(filter.is_favorited.is_none());
    }
}
