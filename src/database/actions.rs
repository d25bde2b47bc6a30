pub mod ingredients;
pub mod recipes;
pub mod relations;
pub mod shopping_cart;
pub mod tags;
pub mod users;

use sqlx::{Pool, Postgres};

use crate::error::{QueryError, ServiceError};

pub use ingredients::*;
pub use recipes::*;
pub use relations::*;
pub use shopping_cart::*;
pub use tags::*;
pub use users::*;

/// Applies the embedded migrations under `migrations/`.
pub async fn migrate(pool: &Pool<Postgres>) -> Result<(), ServiceError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| QueryError::new(format!("Migration failed: {e}")))?;

    Ok(())
}
