use std::collections::{BTreeSet, HashMap, HashSet};

use redis::aio::MultiplexedConnection;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    authentication::permissions::ActionType,
    cache::{invalidate_cache, CacheKey, CacheLifetime, RedisValue},
    config::Limits,
    constants::MAX_BIND_PARAMETERS,
    diff::{IngredientReplace, SetDiff},
    error::{Entity, QueryError, ServiceError},
    form::{RecipeForm, RecipeQuery},
    pagination::{window, Page},
    schema::{
        Id, LinkedRecipeIngredient, LinkedRecipeTag, RecipeCore, RecipeDetail, RecipeRow,
        RecipeShort, User, ViewerFlags,
    },
    session::SessionData,
    validation::{validate_recipe, ValidRecipe},
};

use super::{
    ingredients::resolve_ingredients,
    tags::{list_recipe_tag_ids, resolve_tags},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeTarget {
    Create,
    Update(Id),
}

/// Creates or rewrites a recipe together with its tag and ingredient sets, atomically.
///
/// Every check that needs no store access runs first. Tag and ingredient ids are then
/// resolved inside the transaction, before the first write. Any failure after that drops
/// the transaction uncommitted.
pub async fn compose_recipe(
    target: ComposeTarget,
    form: RecipeForm,
    session: &SessionData,
    limits: &Limits,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<RecipeDetail, ServiceError> {
    let creating = target == ComposeTarget::Create;
    session.authenticate(if creating {
        ActionType::CreateRecipes
    } else {
        ActionType::ManageOwnRecipes
    })?;
    let recipe = validate_recipe(form, creating, limits)?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    if let ComposeTarget::Update(id) = target {
        let existing = lock_recipe(&mut tr, id).await?;
        session.authenticate_owner(
            existing.author_id,
            ActionType::ManageOwnRecipes,
            ActionType::ManageAllRecipes,
        )?;
    }

    resolve_tags(&mut tr, &recipe.tags).await?;
    resolve_ingredients(&mut tr, &recipe.ingredient_ids()).await?;

    let recipe_id = match target {
        ComposeTarget::Create => insert_recipe(&mut tr, session.user_id, &recipe).await?,
        ComposeTarget::Update(id) => {
            update_recipe_fields(&mut tr, id, &recipe).await?;
            id
        }
    };

    let current = list_recipe_tag_ids(&mut tr, recipe_id).await?;
    let tag_diff = SetDiff::plan(&current, &recipe.tags);
    if !tag_diff.is_empty() {
        log::debug!(
            "Recipe {recipe_id}: tags -{:?} +{:?}",
            tag_diff.remove,
            tag_diff.insert
        );
    }
    apply_tag_diff(&mut tr, recipe_id, &tag_diff).await?;
    replace_ingredients(&mut tr, &IngredientReplace::plan(recipe_id, &recipe.ingredients)).await?;

    let core = load_recipe_core(&mut tr, recipe_id)
        .await?
        .ok_or(ServiceError::Removed(Entity::Recipe))?;
    let flags = viewer_flags(&mut tr, &[core.recipe.clone()], Some(session))
        .await?
        .remove(&recipe_id)
        .unwrap_or_default();

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!(
        "{} recipe {recipe_id} by user {}",
        if creating { "Created" } else { "Updated" },
        session.user_id
    );
    invalidate_cache(CacheLifetime::BindRecipeCache, cache).await;

    Ok(RecipeDetail::from_core(core, flags))
}

async fn lock_recipe(conn: &mut PgConnection, id: Id) -> Result<RecipeRow, ServiceError> {
    let row: Option<RecipeRow> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.ok_or(ServiceError::Reference {
        entity: Entity::Recipe,
        id,
    })
}

async fn insert_recipe(
    conn: &mut PgConnection,
    author_id: Id,
    recipe: &ValidRecipe,
) -> Result<Id, ServiceError> {
    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(recipe.image.as_deref().unwrap_or_default())
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id.0)
}

async fn update_recipe_fields(
    conn: &mut PgConnection,
    id: Id,
    recipe: &ValidRecipe,
) -> Result<(), ServiceError> {
    sqlx::query(
        "UPDATE recipes SET name = $1, text = $2, image = COALESCE($3, image), cooking_time = $4 WHERE id = $5",
    )
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(&recipe.image)
    .bind(recipe.cooking_time)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn apply_tag_diff(
    conn: &mut PgConnection,
    recipe_id: Id,
    diff: &SetDiff<Id>,
) -> Result<(), ServiceError> {
    if !diff.remove.is_empty() {
        let remove: Vec<Id> = diff.remove.iter().copied().collect();
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1 AND tag_id = ANY($2)")
            .bind(recipe_id)
            .bind(&remove)
            .execute(&mut *conn)
            .await?;
    }

    if !diff.insert.is_empty() {
        let insert: Vec<Id> = diff.insert.iter().copied().collect();
        for chunk in insert.chunks(MAX_BIND_PARAMETERS / 2) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

            query_builder.push_values(chunk, |mut b, &tag_id| {
                b.push_bind(recipe_id).push_bind(tag_id);
            });

            query_builder.build().execute(&mut *conn).await?;
        }
    }

    Ok(())
}

async fn replace_ingredients(
    conn: &mut PgConnection,
    plan: &IngredientReplace,
) -> Result<(), ServiceError> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(plan.recipe_id)
        .execute(&mut *conn)
        .await?;

    for chunk in plan.rows.chunks(MAX_BIND_PARAMETERS / 3) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");

        query_builder.push_values(chunk, |mut b, &(ingredient_id, amount)| {
            b.push_bind(plan.recipe_id)
                .push_bind(ingredient_id)
                .push_bind(amount);
        });

        query_builder.build().execute(&mut *conn).await?;
    }

    Ok(())
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<RecipeRow>, ServiceError> {
    let row: Option<RecipeRow> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Loads a recipe the session may modify: its own, or any for admins.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<RecipeRow, ServiceError> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = get_recipe(id, pool).await?.ok_or(ServiceError::Reference {
        entity: Entity::Recipe,
        id,
    })?;

    session.authenticate_owner(
        recipe.author_id,
        ActionType::ManageOwnRecipes,
        ActionType::ManageAllRecipes,
    )?;
    Ok(recipe)
}

pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<(), ServiceError> {
    get_recipe_mut(id, session, pool).await?;

    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::Removed(Entity::Recipe));
    }

    log::info!("Deleted recipe {id} by user {}", session.user_id);
    invalidate_cache(CacheLifetime::BindRecipeCache, cache).await;

    Ok(())
}

pub async fn get_recipe_short(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeShort>, ServiceError> {
    let row: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row)
}

pub async fn get_recipe_detail(
    id: Id,
    viewer: Option<&SessionData>,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<RecipeDetail, ServiceError> {
    let core = RedisValue::get_or_optional(CacheKey::recipe(id), cache, || {
        fetch_recipe_core(id, pool)
    })
    .await?
    .ok_or(ServiceError::Reference {
        entity: Entity::Recipe,
        id,
    })?;

    let mut conn = pool.acquire().await?;
    let flags = viewer_flags(&mut conn, &[core.recipe.clone()], viewer)
        .await?
        .remove(&id)
        .unwrap_or_default();

    Ok(RecipeDetail::from_core(core, flags))
}

/// Recipes newest first, filtered by author, any of the tag slugs, and the viewer's own lists.
pub async fn list_recipes(
    query: &RecipeQuery,
    viewer: Option<&SessionData>,
    page_size: i64,
    pool: &Pool<Postgres>,
) -> Result<Page<RecipeDetail>, ServiceError> {
    let (limit, offset) = window(query.limit, query.offset, page_size);

    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
    push_recipe_filters(&mut count_builder, query, viewer);

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.* FROM recipes r WHERE TRUE");
    push_recipe_filters(&mut query_builder, query, viewer);
    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    log::debug!("{}", query_builder.sql());

    let mut conn = pool.acquire().await?;
    let total_count: (i64,) = count_builder
        .build_query_as()
        .fetch_one(&mut *conn)
        .await?;
    let recipes: Vec<RecipeRow> = query_builder
        .build_query_as()
        .fetch_all(&mut *conn)
        .await?;

    let mut flags = viewer_flags(&mut conn, &recipes, viewer).await?;
    let details = load_cores(&mut conn, recipes)
        .await?
        .into_iter()
        .map(|core| {
            let recipe_flags = flags.remove(&core.recipe.id).unwrap_or_default();
            RecipeDetail::from_core(core, recipe_flags)
        })
        .collect();

    Ok(Page::from_rows(details, total_count.0, limit, offset))
}

/// Appends the `list_recipes` filters to a query over `recipes r`.
fn push_recipe_filters<'a>(
    query_builder: &mut QueryBuilder<'a, Postgres>,
    query: &RecipeQuery,
    viewer: Option<&SessionData>,
) {
    if let Some(author) = query.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }
    if !query.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(query.tags.clone())
            .push("))");
    }
    if let Some(viewer) = viewer {
        if query.is_favorited {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer.user_id)
                .push(")");
        }
        if query.is_in_shopping_cart {
            query_builder
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(viewer.user_id)
                .push(")");
        }
    }
}

async fn fetch_recipe_core(
    id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeCore>, ServiceError> {
    let mut conn = pool.acquire().await?;
    load_recipe_core(&mut conn, id).await
}

pub async fn load_recipe_core(
    conn: &mut PgConnection,
    id: Id,
) -> Result<Option<RecipeCore>, ServiceError> {
    let row: Option<RecipeRow> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(load_cores(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Joins authors, tags and ingredients onto recipe rows, keeping the row order.
pub async fn load_cores(
    conn: &mut PgConnection,
    rows: Vec<RecipeRow>,
) -> Result<Vec<RecipeCore>, ServiceError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Id> = rows.iter().map(|row| row.id).collect();
    let author_ids: Vec<Id> = rows
        .iter()
        .map(|row| row.author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let authors: Vec<User> = sqlx::query_as(
        "SELECT id, email, username, first_name, last_name, role FROM users WHERE id = ANY($1)",
    )
    .bind(&author_ids)
    .fetch_all(&mut *conn)
    .await?;

    let tags: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id AS recipe_id, t.id AS id, t.name AS name, t.color AS color, t.slug AS slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(&mut *conn)
    .await?;

    let ingredients: Vec<LinkedRecipeIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(&mut *conn)
    .await?;

    let authors: HashMap<Id, User> = authors.into_iter().map(|user| (user.id, user)).collect();

    let mut tags_by_recipe: HashMap<Id, Vec<_>> = HashMap::new();
    tags.into_iter().for_each(|tag| {
        tags_by_recipe
            .entry(tag.recipe_id)
            .or_default()
            .push(tag.into())
    });

    let mut ingredients_by_recipe: HashMap<Id, Vec<_>> = HashMap::new();
    ingredients.into_iter().for_each(|ingredient| {
        ingredients_by_recipe
            .entry(ingredient.recipe_id)
            .or_default()
            .push(ingredient.into())
    });

    rows.into_iter()
        .map(|recipe| {
            let author = authors
                .get(&recipe.author_id)
                .cloned()
                .ok_or(ServiceError::Removed(Entity::User))?;

            Ok(RecipeCore {
                tags: tags_by_recipe.remove(&recipe.id).unwrap_or_default(),
                ingredients: ingredients_by_recipe.remove(&recipe.id).unwrap_or_default(),
                author,
                recipe,
            })
        })
        .collect()
}

/// Per-recipe flags for `viewer`; anonymous viewers get all-false flags.
pub async fn viewer_flags(
    conn: &mut PgConnection,
    recipes: &[RecipeRow],
    viewer: Option<&SessionData>,
) -> Result<HashMap<Id, ViewerFlags>, ServiceError> {
    let Some(viewer) = viewer else {
        return Ok(HashMap::new());
    };
    if recipes.is_empty() {
        return Ok(HashMap::new());
    }

    let recipe_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let author_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.author_id).collect();

    let subscribed: Vec<(Id,)> = sqlx::query_as(
        "SELECT author_id FROM subscriptions WHERE user_id = $1 AND author_id = ANY($2)",
    )
    .bind(viewer.user_id)
    .bind(&author_ids)
    .fetch_all(&mut *conn)
    .await?;

    let favorited: Vec<(Id,)> =
        sqlx::query_as("SELECT recipe_id FROM favorites WHERE user_id = $1 AND recipe_id = ANY($2)")
            .bind(viewer.user_id)
            .bind(&recipe_ids)
            .fetch_all(&mut *conn)
            .await?;

    let in_cart: Vec<(Id,)> = sqlx::query_as(
        "SELECT recipe_id FROM shopping_cart WHERE user_id = $1 AND recipe_id = ANY($2)",
    )
    .bind(viewer.user_id)
    .bind(&recipe_ids)
    .fetch_all(&mut *conn)
    .await?;

    let subscribed: HashSet<Id> = subscribed.into_iter().map(|row| row.0).collect();
    let favorited: HashSet<Id> = favorited.into_iter().map(|row| row.0).collect();
    let in_cart: HashSet<Id> = in_cart.into_iter().map(|row| row.0).collect();

    Ok(recipes
        .iter()
        .map(|recipe| {
            (
                recipe.id,
                ViewerFlags {
                    is_subscribed: subscribed.contains(&recipe.author_id),
                    is_favorited: favorited.contains(&recipe.id),
                    is_in_shopping_cart: in_cart.contains(&recipe.id),
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UserRole;

    fn filters(query: &RecipeQuery, viewer: Option<&SessionData>) -> String {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("");
        push_recipe_filters(&mut query_builder, query, viewer);
        query_builder.sql().to_owned()
    }

    #[test]
    fn count_and_page_share_filters() {
        let query = RecipeQuery {
            author: Some(2),
            tags: vec![String::from("breakfast")],
            is_favorited: true,
            ..Default::default()
        };
        let viewer = SessionData::new(7, "cook", UserRole::User);

        let sql = filters(&query, Some(&viewer));
        assert!(sql.contains("r.author_id = $1"));
        assert!(sql.contains("t.slug = ANY($2)"));
        assert!(sql.contains("f.user_id = $3"));
        assert!(!sql.contains("shopping_cart"));
    }

    #[test]
    fn anonymous_viewers_skip_own_list_filters() {
        let query = RecipeQuery {
            is_favorited: true,
            is_in_shopping_cart: true,
            ..Default::default()
        };
        assert_eq!(filters(&query, None), "");
    }
}
