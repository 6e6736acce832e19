use std::io::Read;

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{
        error::{QueryError, TypeError},
        form::Form,
        schema::{Id, Ingredient},
        validation::validate_ingredient,
    },
    error::{Error, ErrorKind},
};

use sqlx::{Pool, Postgres};

pub async fn create_ingredient(
    session: &SessionData,
    form: &Form,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    session.authenticate(ActionType::ManageIngredients)?;
    let input = validate_ingredient(form)?;

    let ingredient: Option<Ingredient> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING RETURNING *
    ",
    )
    .bind(&input.name)
    .bind(&input.measurement_unit)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    ingredient.ok_or_else(|| ErrorKind::Conflict.new("An ingredient with this name already exists"))
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Lists ingredients by name, optionally only those starting with `name_prefix`
/// (case-insensitive).
pub async fn list_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => sqlx::query_as(
            "SELECT * FROM ingredients WHERE LOWER(name) LIKE LOWER($1) || '%' ORDER BY name",
        )
        .bind(escape_like(prefix))
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?,
        None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name")
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?,
    };

    Ok(rows)
}

/// Ids out of `ids` that have no ingredient row.
pub async fn missing_ingredients(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<Id>, Error> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(ids
        .iter()
        .filter(|id| !found.iter().any(|(found,)| found == *id))
        .copied()
        .collect())
}

/// Parses `name,measurement_unit` lines. Blank names are skipped.
pub fn parse_ingredients_csv<R: Read>(reader: R) -> Result<Vec<(String, String)>, TypeError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|_e| TypeError::new("Malformed CSV record"))?;
        let name = record.get(0).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let unit = record
            .get(1)
            .filter(|unit| !unit.is_empty())
            .ok_or_else(|| {
                log::warn!("ingredient csv line {} has no measurement unit", line + 1);
                TypeError::new("Every ingredient needs a measurement unit")
            })?;

        rows.push((name.to_string(), unit.to_string()));
    }
    Ok(rows)
}

/// Bulk import for seeding the ingredient catalogue. Names that already exist
/// are left untouched. Returns how many rows were inserted.
pub async fn load_ingredients_csv<R: Read>(reader: R, pool: &Pool<Postgres>) -> Result<u64, Error> {
    let rows = parse_ingredients_csv(reader)?;

    let mut tx = pool.begin().await.map_err(QueryError::from)?;
    let mut inserted = 0;
    for (name, unit) in &rows {
        let result = sqlx::query(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(unit)
        .execute(&mut *tx)
        .await
        .map_err(QueryError::from)?;
        inserted += result.rows_affected();
    }
    tx.commit().await.map_err(QueryError::from)?;

    log::info!(
        "loaded {inserted} ingredients ({} already present)",
        rows.len() as u64 - inserted
    );
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_unit_pairs() {
        let data = "flour, g\n\"eggs, large\",pcs\n\n  ,ignored\nsugar,g\n";
        let rows = parse_ingredients_csv(data.as_bytes()).unwrap();

        assert_eq!(
            rows,
            vec![
                ("flour".to_string(), "g".to_string()),
                ("eggs, large".to_string(), "pcs".to_string()),
                ("sugar".to_string(), "g".to_string()),
            ]
        );
    }

    #[test]
    fn missing_unit_is_rejected() {
        assert!(parse_ingredients_csv("salt\n".as_bytes()).is_err());
        assert!(parse_ingredients_csv("salt,\n".as_bytes()).is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
