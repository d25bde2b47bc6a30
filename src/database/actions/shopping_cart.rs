use sqlx::{Pool, Postgres};
use warp::{http::header::CONTENT_DISPOSITION, http::header::CONTENT_TYPE, Reply};

use crate::{
    authentication::permissions::ActionType,
    constants::SHOPPING_LIST_FILENAME,
    error::ServiceError,
    schema::RecipeShort,
    session::SessionData,
    shopping::{CartLine, Report},
};

pub async fn list_cart_recipes(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeShort>, ServiceError> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;

    let recipes: Vec<RecipeShort> = sqlx::query_as(
        "
        SELECT r.id AS id, r.name AS name, r.image AS image, r.cooking_time AS cooking_time
        FROM shopping_cart c
        INNER JOIN recipes r ON r.id = c.recipe_id
        WHERE c.user_id = $1
        ORDER BY c.id
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await?;

    Ok(recipes)
}

/// Sums the ingredients of every recipe in the session's cart. Read-only.
pub async fn download_shopping_list(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Report, ServiceError> {
    session.authenticate(ActionType::ManageOwnShoppingCart)?;

    let cart_recipes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shopping_cart WHERE user_id = $1")
        .bind(session.user_id)
        .fetch_one(pool)
        .await?;

    let lines: Vec<CartLine> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS ingredient_id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM (SELECT DISTINCT recipe_id FROM shopping_cart WHERE user_id = $1) c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await?;

    log::debug!(
        "Aggregating {} lines from {} cart recipes for user {}",
        lines.len(),
        cart_recipes.0,
        session.user_id
    );
    Report::from_cart(cart_recipes.0, lines)
}

/// `text/plain` download of a rendered report.
pub fn shopping_list_attachment(report: &Report) -> warp::reply::Response {
    let reply = warp::reply::with_header(
        report.render(),
        CONTENT_TYPE,
        "text/plain; charset=utf-8",
    );
    warp::reply::with_header(
        reply,
        CONTENT_DISPOSITION,
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    )
    .into_response()
}
