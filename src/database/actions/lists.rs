//! Favorites and the shopping cart: two per-user recipe sets with the same
//! shape and the same uniqueness rules, kept in separate tables.

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{error::QueryError, representation::ShortRecipe, schema::Id},
    error::{Error, ErrorKind},
};

use super::conflict_unless_changed;
use sqlx::{Pool, Postgres};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    fn table(self) -> &'static str {
        match self {
            RecipeList::Favorites => "favorites",
            RecipeList::ShoppingCart => "shopping_cart",
        }
    }

    fn action(self) -> ActionType {
        match self {
            RecipeList::Favorites => ActionType::ManageOwnFavorites,
            RecipeList::ShoppingCart => ActionType::ManageOwnShoppingCart,
        }
    }

    pub fn already_present_message(self) -> &'static str {
        match self {
            RecipeList::Favorites => "Recipe is already in favorites",
            RecipeList::ShoppingCart => "Recipe is already in shopping cart",
        }
    }

    pub fn not_present_message(self) -> &'static str {
        match self {
            RecipeList::Favorites => "Recipe is not in favorites",
            RecipeList::ShoppingCart => "Recipe is not in shopping cart",
        }
    }
}

pub async fn list_contains(
    list: RecipeList,
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let result: Option<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE recipe_id = $1 AND user_id = $2",
        list.table()
    ))
    .bind(recipe_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(result.is_some())
}

pub async fn add_to_list(
    list: RecipeList,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    session.authenticate(list.action())?;

    let recipe: Option<ShortRecipe> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;
    let recipe = recipe.ok_or_else(|| ErrorKind::NotFound.new("Recipe not found"))?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        list.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    conflict_unless_changed(result.rows_affected(), list.already_present_message())?;

    log::debug!("user {} added recipe {recipe_id} to {:?}", session.user_id, list);
    Ok(recipe)
}

pub async fn remove_from_list(
    list: RecipeList,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(list.action())?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        list.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    conflict_unless_changed(result.rows_affected(), list.not_present_message())?;

    log::debug!("user {} removed recipe {recipe_id} from {:?}", session.user_id, list);
    Ok(())
}

pub async fn is_favorite(recipe_id: Id, user_id: Id, pool: &Pool<Postgres>) -> Result<bool, Error> {
    list_contains(RecipeList::Favorites, recipe_id, user_id, pool).await
}

pub async fn add_to_favorites(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    add_to_list(RecipeList::Favorites, recipe_id, session, pool).await
}

pub async fn remove_from_favorites(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    remove_from_list(RecipeList::Favorites, recipe_id, session, pool).await
}

pub async fn is_in_shopping_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    list_contains(RecipeList::ShoppingCart, recipe_id, user_id, pool).await
}

pub async fn add_to_shopping_cart(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    add_to_list(RecipeList::ShoppingCart, recipe_id, session, pool).await
}

pub async fn remove_from_shopping_cart(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    remove_from_list(RecipeList::ShoppingCart, recipe_id, session, pool).await
}
