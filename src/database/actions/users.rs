use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    error::{Entity, ServiceError},
    pagination::{window, Page},
    schema::{Id, LinkedRecipeShort, RecipeShort, SubscriptionCard, User, UserProfile},
    session::SessionData,
};

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, ServiceError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_profile(
    user_id: Id,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ServiceError> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or(ServiceError::Reference {
            entity: Entity::User,
            id: user_id,
        })?;

    let is_subscribed = match viewer {
        Some(viewer) => is_subscribed(viewer.user_id, user_id, pool).await?,
        None => false,
    };

    Ok(UserProfile::from_user(user, is_subscribed))
}

async fn is_subscribed(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<bool, ServiceError> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1 AND author_id = $2)",
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Follows `author_id`. Following yourself is rejected before the store is consulted.
pub async fn subscribe(
    author_id: Id,
    recipes_limit: i64,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionCard, ServiceError> {
    if author_id == session.user_id {
        return Err(ServiceError::validation("You can't subscribe to yourself"));
    }
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    let author = get_user_by_id(pool, author_id)
        .await?
        .ok_or(ServiceError::Reference {
            entity: Entity::User,
            id: author_id,
        })?;

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::Conflict(format!(
            "Already subscribed to {}",
            author.username
        )));
    }

    log::debug!("User {} subscribed to {author_id}", session.user_id);
    let mut cards = load_cards(vec![author], recipes_limit, pool).await?;
    cards.pop().ok_or(ServiceError::Removed(Entity::User))
}

pub async fn unsubscribe(
    author_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ServiceError> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ServiceError::Reference {
            entity: Entity::User,
            id: author_id,
        });
    }

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound(format!(
            "Not subscribed to user {author_id}"
        )));
    }

    log::debug!("User {} unsubscribed from {author_id}", session.user_id);
    Ok(())
}

pub async fn list_subscriptions(
    limit: Option<i64>,
    offset: i64,
    recipes_limit: i64,
    page_size: i64,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Page<SubscriptionCard>, ServiceError> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let (limit, offset) = window(limit, offset, page_size);

    let total_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
            .bind(session.user_id)
            .fetch_one(pool)
            .await?;

    let authors: Vec<User> = sqlx::query_as(
        "
        SELECT u.*
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY u.username, u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let cards = load_cards(authors, recipes_limit, pool).await?;

    Ok(Page::from_rows(cards, total_count.0, limit, offset))
}

/// Attaches each author's newest `recipes_limit` recipes and total recipe count.
async fn load_cards(
    authors: Vec<User>,
    recipes_limit: i64,
    pool: &Pool<Postgres>,
) -> Result<Vec<SubscriptionCard>, ServiceError> {
    if authors.is_empty() {
        return Ok(vec![]);
    }
    let author_ids: Vec<Id> = authors.iter().map(|author| author.id).collect();

    let recipes: Vec<LinkedRecipeShort> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time FROM (
            SELECT r.*, ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(&author_ids)
    .bind(recipes_limit.max(0))
    .fetch_all(pool)
    .await?;

    let counts: Vec<(Id, i64)> = sqlx::query_as(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(&author_ids)
    .fetch_all(pool)
    .await?;

    let counts: HashMap<Id, i64> = counts.into_iter().collect();
    let mut recipes_by_author: HashMap<Id, Vec<RecipeShort>> = HashMap::new();
    recipes.into_iter().for_each(|recipe| {
        recipes_by_author
            .entry(recipe.author_id)
            .or_default()
            .push(recipe.into())
    });

    Ok(authors
        .into_iter()
        .map(|author| {
            let recipes = recipes_by_author.remove(&author.id).unwrap_or_default();
            let recipes_count = counts.get(&author.id).copied().unwrap_or(0);
            SubscriptionCard::new(author, recipes, recipes_count)
        })
        .collect())
}
