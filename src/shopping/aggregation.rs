use std::collections::BTreeMap;

use crate::{
    database::{error::QueryError, schema::Id},
    error::Error,
};

use serde::Serialize;
use sqlx::{Pool, Postgres};

/// One ingredient use inside one cart recipe.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct CartPart {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i16,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListRow {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

impl ShoppingListRow {
    /// The row as printed in the exported document.
    pub fn line(&self) -> String {
        format!(
            "{}   {}  ({})",
            self.name, self.total_amount, self.measurement_unit
        )
    }
}

/// Sums amounts per `(name, measurement_unit)` and orders the result by name,
/// then unit, comparing the stored strings byte by byte.
pub fn aggregate_parts<I>(parts: I) -> Vec<ShoppingListRow>
where
    I: IntoIterator<Item = CartPart>,
{
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for part in parts {
        *totals
            .entry((part.name, part.measurement_unit))
            .or_insert(0) += i64::from(part.amount);
    }

    totals
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListRow {
            name,
            measurement_unit,
            total_amount,
        })
        .collect()
}

pub async fn list_cart_recipe_ids(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<Id>, Error> {
    let rows: Vec<(Id,)> =
        sqlx::query_as("SELECT recipe_id FROM shopping_cart WHERE user_id = $1 ORDER BY recipe_id")
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn list_parts_for_recipes(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<CartPart>, Error> {
    if recipe_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<CartPart> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Aggregated ingredient list of everything in the user's shopping cart.
/// An empty cart gives an empty list.
pub async fn shopping_list(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<ShoppingListRow>, Error> {
    let recipe_ids = list_cart_recipe_ids(user_id, pool).await?;
    let parts = list_parts_for_recipes(&recipe_ids, pool).await?;

    let rows = aggregate_parts(parts);
    log::debug!(
        "shopping list for user {user_id}: {} recipes, {} rows",
        recipe_ids.len(),
        rows.len()
    );
    Ok(rows)
}
