use std::fmt::{self, Display};

use potion::Error;
use serde::Serialize;
use warp::reject::Rejection;

#[derive(Debug)]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

impl std::error::Error for QueryError {}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(format!("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new(format!("Unknown error")),
        }
    }
}

#[derive(Debug)]
pub struct CacheError {
    info: String,
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info)
    }
}

impl std::error::Error for CacheError {}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Recipe,
    Tag,
    Ingredient,
    User,
}

impl Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Recipe => "Recipe",
            Entity::Tag => "Tag",
            Entity::Ingredient => "Ingredient",
            Entity::User => "User",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ValidationError,
    ReferenceError,
    ConflictError,
    NotFoundError,
    EmptyCartError,
    Unauthorized,
    Forbidden,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Ingredient {id} is listed more than once")]
    DuplicateIngredient { id: i32 },

    #[error("Invalid amount {amount} for ingredient {id}")]
    InvalidAmount { id: i32, amount: i32 },

    #[error("{entity} {id} doesn't exist")]
    Reference { entity: Entity, id: i32 },

    #[error("Referenced {0} no longer exists")]
    Removed(Entity),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Shopping cart is empty")]
    EmptyCart,

    #[error("Authentication required")]
    Unauthorized,

    #[error("You don't have permission to perform this action")]
    Forbidden,

    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Cache failed: {0}")]
    Cache(#[from] CacheError),
}

impl ServiceError {
    pub fn validation(info: impl Into<String>) -> Self {
        Self::Validation(info.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_)
            | ServiceError::DuplicateIngredient { .. }
            | ServiceError::InvalidAmount { .. } => ErrorKind::ValidationError,
            ServiceError::Reference { .. } | ServiceError::Removed(_) => {
                ErrorKind::ReferenceError
            }
            ServiceError::Conflict(_) => ErrorKind::ConflictError,
            ServiceError::NotFound(_) => ErrorKind::NotFoundError,
            ServiceError::EmptyCart => ErrorKind::EmptyCartError,
            ServiceError::Unauthorized => ErrorKind::Unauthorized,
            ServiceError::Forbidden => ErrorKind::Forbidden,
            ServiceError::Query(_) | ServiceError::Cache(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Reference {
                entity: Entity::Recipe | Entity::User,
                ..
            }
            | ServiceError::Removed(Entity::Recipe | Entity::User) => 404,
            _ => match self.kind() {
                ErrorKind::ValidationError
                | ErrorKind::ReferenceError
                | ErrorKind::ConflictError
                | ErrorKind::EmptyCartError => 400,
                ErrorKind::NotFoundError => 404,
                ErrorKind::Unauthorized => 401,
                ErrorKind::Forbidden => 403,
                ErrorKind::Internal => 500,
            },
        }
    }
}

/// Classifies constraint violations; everything else is an internal query failure.
impl From<sqlx::Error> for ServiceError {
    fn from(value: sqlx::Error) -> Self {
        if let sqlx::Error::Database(e) = &value {
            if e.is_unique_violation() {
                return ServiceError::Conflict(String::from("Entry already exists"));
            }
            if e.is_foreign_key_violation() {
                return ServiceError::Removed(foreign_key_entity(e.constraint()));
            }
        }
        ServiceError::Query(QueryError::from(value))
    }
}

fn foreign_key_entity(constraint: Option<&str>) -> Entity {
    match constraint {
        Some(name) if name.contains("ingredient_id") => Entity::Ingredient,
        Some(name) if name.contains("tag_id") => Entity::Tag,
        Some(name) if name.contains("recipe_id") => Entity::Recipe,
        _ => Entity::User,
    }
}

impl Into<Error> for ServiceError {
    fn into(self) -> Error {
        Error {
            code: self.status_code().into(),
            info: Some(self.to_string()),
            redirect: None,
        }
    }
}

impl Into<Rejection> for ServiceError {
    fn into(self) -> Rejection {
        let error: Error = self.into();
        error.into()
    }
}
