use std::{
    collections::{BTreeSet, HashSet},
    io::Read,
};

use redis::aio::MultiplexedConnection;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    authentication::permissions::ActionType,
    cache::{invalidate_cache, CacheKey, CacheLifetime, RedisValue},
    config::Limits,
    constants::MAX_BIND_PARAMETERS,
    error::{Entity, QueryError, ServiceError},
    session::SessionData,
    schema::{Id, Ingredient},
    validation::validate_ingredient,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Ingredient, ServiceError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or(ServiceError::Reference {
        entity: Entity::Ingredient,
        id,
    })
}

/// Case-insensitive name prefix search.
pub async fn list_ingredients(
    search: Option<&str>,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<Vec<Ingredient>, ServiceError> {
    let prefix = escape_like(search.unwrap_or("").trim());

    RedisValue::get_or(CacheKey::ingredients(search), cache, || {
        fetch_ingredients(prefix, pool)
    })
    .await
}

async fn fetch_ingredients(
    prefix: String,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ServiceError> {
    let list: Vec<Ingredient> = sqlx::query_as(
        "SELECT * FROM ingredients WHERE name ILIKE $1 || '%' ORDER BY name, measurement_unit",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await?;

    Ok(list)
}

/// Fails on the first requested id with no ingredient row. Found rows stay share-locked until commit.
pub async fn resolve_ingredients(conn: &mut PgConnection, ids: &[Id]) -> Result<(), ServiceError> {
    let rows: Vec<(Id,)> =
        sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1) FOR SHARE")
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;

    let found: BTreeSet<Id> = rows.into_iter().map(|row| row.0).collect();
    match ids.iter().find(|id| !found.contains(id)) {
        Some(&missing) => Err(ServiceError::Reference {
            entity: Entity::Ingredient,
            id: missing,
        }),
        None => Ok(()),
    }
}

/// Reads headerless `name,measurement_unit` rows. Repeated pairs are kept once.
pub fn parse_ingredient_csv<R: Read>(
    reader: R,
    limits: &Limits,
) -> Result<Vec<NewIngredient>, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut seen = HashSet::new();
    let mut rows = vec![];
    for (index, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| ServiceError::validation(format!("Row {}: {e}", index + 1)))?;

        let (name, measurement_unit) = match (record.get(0), record.get(1), record.len()) {
            (Some(name), Some(unit), 2) => (name, unit),
            _ => {
                return Err(ServiceError::validation(format!(
                    "Row {}: expected name and measurement unit",
                    index + 1
                )))
            }
        };
        validate_ingredient(name, measurement_unit, limits)?;

        let row = NewIngredient {
            name: name.to_owned(),
            measurement_unit: measurement_unit.to_owned(),
        };
        if seen.insert(row.clone()) {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Returns the number of ingredients that didn't exist yet.
pub async fn import_ingredients<R: Read>(
    reader: R,
    session: &SessionData,
    limits: &Limits,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<u64, ServiceError> {
    session.authenticate(ActionType::ManageCatalog)?;
    let rows = parse_ingredient_csv(reader, limits)?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    let mut inserted = 0;
    for chunk in rows.chunks(MAX_BIND_PARAMETERS / 2) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.name).push_bind(&row.measurement_unit);
        });
        query_builder.push(" ON CONFLICT (name, measurement_unit) DO NOTHING");

        inserted += query_builder
            .build()
            .execute(&mut *tr)
            .await?
            .rows_affected();
    }

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!("Imported {inserted} of {} ingredients", rows.len());
    invalidate_cache(CacheLifetime::BindCatalogCache, cache).await;

    Ok(inserted)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows() {
        let data = "flour, g\nmilk,ml\n\"salt, coarse\",g\nflour,g\n";
        let rows = parse_ingredient_csv(data.as_bytes(), &Limits::default()).unwrap();

        assert_eq!(
            rows,
            vec![
                NewIngredient {
                    name: String::from("flour"),
                    measurement_unit: String::from("g"),
                },
                NewIngredient {
                    name: String::from("milk"),
                    measurement_unit: String::from("ml"),
                },
                NewIngredient {
                    name: String::from("salt, coarse"),
                    measurement_unit: String::from("g"),
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_rows() {
        let limits = Limits::default();
        assert!(parse_ingredient_csv("flour\n".as_bytes(), &limits).is_err());
        assert!(parse_ingredient_csv("flour,g,extra\n".as_bytes(), &limits).is_err());
        assert!(parse_ingredient_csv("flour,\n".as_bytes(), &limits).is_err());
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("flour"), "flour");
    }
}
