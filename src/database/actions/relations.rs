use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    error::{Entity, ServiceError},
    schema::{Id, RecipeShort},
    session::SessionData,
};

use super::recipes::get_recipe_short;

/// A per-user list of recipes, with at most one entry per (user, recipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeRelation {
    Favorites,
    ShoppingCart,
}

impl RecipeRelation {
    fn table(&self) -> &'static str {
        match self {
            RecipeRelation::Favorites => "favorites",
            RecipeRelation::ShoppingCart => "shopping_cart",
        }
    }

    fn action(&self) -> ActionType {
        match self {
            RecipeRelation::Favorites => ActionType::ManageOwnFavorites,
            RecipeRelation::ShoppingCart => ActionType::ManageOwnShoppingCart,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RecipeRelation::Favorites => "favorites",
            RecipeRelation::ShoppingCart => "shopping cart",
        }
    }
}

pub async fn add_recipe_relation(
    relation: RecipeRelation,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, ServiceError> {
    session.authenticate(relation.action())?;

    let recipe = get_recipe_short(recipe_id, pool)
        .await?
        .ok_or(ServiceError::Reference {
            entity: Entity::Recipe,
            id: recipe_id,
        })?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        relation.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::Conflict(format!(
            "Recipe {recipe_id} is already in {}",
            relation.label()
        )));
    }

    log::debug!(
        "User {} added recipe {recipe_id} to {}",
        session.user_id,
        relation.label()
    );
    Ok(recipe)
}

pub async fn remove_recipe_relation(
    relation: RecipeRelation,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ServiceError> {
    session.authenticate(relation.action())?;

    if get_recipe_short(recipe_id, pool).await?.is_none() {
        return Err(ServiceError::Reference {
            entity: Entity::Recipe,
            id: recipe_id,
        });
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        relation.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound(format!(
            "Recipe {recipe_id} is not in {}",
            relation.label()
        )));
    }

    log::debug!(
        "User {} removed recipe {recipe_id} from {}",
        session.user_id,
        relation.label()
    );
    Ok(())
}

pub async fn add_favorite(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, ServiceError> {
    add_recipe_relation(RecipeRelation::Favorites, recipe_id, session, pool).await
}

pub async fn remove_favorite(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ServiceError> {
    remove_recipe_relation(RecipeRelation::Favorites, recipe_id, session, pool).await
}

pub async fn add_to_cart(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, ServiceError> {
    add_recipe_relation(RecipeRelation::ShoppingCart, recipe_id, session, pool).await
}

pub async fn remove_from_cart(
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), ServiceError> {
    remove_recipe_relation(RecipeRelation::ShoppingCart, recipe_id, session, pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_map_to_own_tables() {
        assert_eq!(RecipeRelation::Favorites.table(), "favorites");
        assert_eq!(RecipeRelation::ShoppingCart.table(), "shopping_cart");
        assert_eq!(
            RecipeRelation::ShoppingCart.action(),
            ActionType::ManageOwnShoppingCart
        );
    }
}
