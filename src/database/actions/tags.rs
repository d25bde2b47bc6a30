use std::collections::BTreeSet;

use redis::aio::MultiplexedConnection;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    cache::{invalidate_cache, CacheKey, CacheLifetime, RedisValue},
    config::Limits,
    error::{Entity, ServiceError},
    form::NewTag,
    session::SessionData,
    schema::{Id, Tag},
    validation::validate_tag,
};

pub async fn create_tag(
    tag: NewTag,
    session: &SessionData,
    limits: &Limits,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<Tag, ServiceError> {
    session.authenticate(ActionType::ManageCatalog)?;
    validate_tag(&tag, limits)?;

    let created: Option<Tag> = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING RETURNING *",
    )
    .bind(&tag.name)
    .bind(&tag.color)
    .bind(&tag.slug)
    .fetch_optional(pool)
    .await?;

    let created = created.ok_or_else(|| {
        ServiceError::Conflict(String::from(
            "A tag with this name, color or slug already exists",
        ))
    })?;

    log::info!("Created tag {} ({})", created.slug, created.id);
    invalidate_cache(CacheLifetime::BindCatalogCache, cache).await;

    Ok(created)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Tag, ServiceError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    tag.ok_or(ServiceError::Reference {
        entity: Entity::Tag,
        id,
    })
}

pub async fn list_tags(
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<Vec<Tag>, ServiceError> {
    RedisValue::get_or(CacheKey::tags(), cache, || fetch_tags(pool)).await
}

async fn fetch_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ServiceError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn list_recipe_tag_ids(
    conn: &mut PgConnection,
    recipe_id: Id,
) -> Result<BTreeSet<Id>, ServiceError> {
    let rows: Vec<(Id,)> = sqlx::query_as("SELECT tag_id FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Fails on the first requested id with no tag row. Found rows stay share-locked until commit.
pub async fn resolve_tags(conn: &mut PgConnection, ids: &BTreeSet<Id>) -> Result<(), ServiceError> {
    let requested: Vec<Id> = ids.iter().copied().collect();
    let rows: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1) FOR SHARE")
        .bind(&requested)
        .fetch_all(&mut *conn)
        .await?;

    let found: BTreeSet<Id> = rows.into_iter().map(|row| row.0).collect();
    match ids.difference(&found).next() {
        Some(&missing) => Err(ServiceError::Reference {
            entity: Entity::Tag,
            id: missing,
        }),
        None => Ok(()),
    }
}
