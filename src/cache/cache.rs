use std::{
    fmt::{self, Display},
    future::Future,
};

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CacheError, ServiceError},
    schema::Id,
};

// Caching - keys

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Recipe,
    Tags,
    Ingredients,
}

impl CacheKeyType {
    pub fn new<T: ToString>(self, key: T) -> CacheKey {
        CacheKey {
            value: key.to_string(),
            r#type: self,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    value: String,
    r#type: CacheKeyType,
}

impl CacheKey {
    pub fn recipe(id: Id) -> Self {
        CacheKeyType::Recipe.new(id)
    }

    pub fn tags() -> Self {
        CacheKeyType::Tags.new("all")
    }

    pub fn ingredients(search: Option<&str>) -> Self {
        CacheKeyType::Ingredients.new(search.unwrap_or("").to_lowercase())
    }

    pub fn lifetime(&self) -> CacheLifetime {
        match self.r#type {
            CacheKeyType::Recipe => CacheLifetime::BindRecipeCache,
            CacheKeyType::Tags | CacheKeyType::Ingredients => CacheLifetime::BindCatalogCache,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.r#type {
            CacheKeyType::Recipe => write!(f, "recipe-{}", self.value),
            CacheKeyType::Tags => write!(f, "tags-{}", self.value),
            CacheKeyType::Ingredients => write!(f, "ingredients-{}", self.value),
        }
    }
}

// Cache - generations

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindRecipeCache,
    BindCatalogCache,
}

impl CacheLifetime {
    fn bind_key(&self) -> &'static str {
        match self {
            CacheLifetime::BindRecipeCache => "recipe-cache-key",
            CacheLifetime::BindCatalogCache => "catalog-cache-key",
        }
    }

    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, ServiceError> {
        get_cache_value::<&str, String>(self.bind_key(), cache).await
    }

    /// Starts a new generation; every value bound to the old one becomes stale.
    pub async fn invalidate(&self, cache: &mut MultiplexedConnection) -> Result<(), ServiceError> {
        let key = self.bind_key();
        let generation = uuid::Uuid::new_v4().to_string();
        log::trace!("> Invalidating {key} ({generation})");
        set_cache_value(key, generation, cache).await
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    /// `bind` must be the generation read before `value` was loaded from the store.
    /// A value loaded across an invalidation then carries the old generation and is never served.
    fn bound(value: T, lifetime: CacheLifetime, bind: Option<String>) -> Self {
        Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        }
    }

    fn is_current(&self, bind: &Option<String>) -> bool {
        self._bind == *bind
    }

    async fn validate(&self, cache: &mut MultiplexedConnection) -> Result<bool, ServiceError> {
        let bind = self._lifetime.get_cache_bind(cache).await?;
        Ok(self.is_current(&bind))
    }

    async fn lookup(key: &CacheKey, cache: &mut MultiplexedConnection) -> Option<T> {
        let value = get_cache_value::<String, RedisValue<T>>(key.to_string(), cache)
            .await
            .unwrap_or_else(|_| {
                let mut c = cache.clone();
                let k = key.to_string();
                tokio::spawn(async move {
                    log::error!("> Failed to deserialize cached value. Deleting {}", &k);
                    if let Err(e) = delete_cache_value(k, &mut c).await {
                        log::error!("> Failed to delete cached value! {e}");
                    }
                });
                None
            })?;

        log::trace!("> Found {}", key);
        match value.validate(cache).await {
            Ok(true) => Some(value.value),
            Ok(false) => {
                log::trace!("> Invalidated {}", key);
                None
            }
            Err(e) => {
                log::error!("> Failed to validate {}: {e}", key);
                None
            }
        }
    }

    /// Reads the generation a value about to be loaded will be stored under.
    async fn capture_bind(key: &CacheKey, cache: &mut MultiplexedConnection) -> Option<Option<String>> {
        match key.lifetime().get_cache_bind(cache).await {
            Ok(bind) => Some(bind),
            Err(e) => {
                log::error!("> Failed to read generation for {}: {e}", key);
                None
            }
        }
    }

    async fn store(key: &CacheKey, value: T, bind: Option<String>, cache: &mut MultiplexedConnection) {
        let stored = RedisValue::bound(value, key.lifetime(), bind);
        if let Err(e) = set_cache_value(key.to_string(), stored, cache).await {
            log::error!("{e}");
        }
    }

    pub async fn get_or_optional<F, Fut>(
        key: CacheKey,
        cache: Option<&mut MultiplexedConnection>,
        callback: F,
    ) -> Result<Option<T>, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, ServiceError>>,
    {
        let Some(cache) = cache else {
            return callback().await;
        };

        if let Some(value) = Self::lookup(&key, cache).await {
            return Ok(Some(value));
        }

        let bind = Self::capture_bind(&key, cache).await;
        log::trace!("> Fetching {}", key);
        match (callback().await?, bind) {
            (Some(value), Some(bind)) => {
                Self::store(&key, value.clone(), bind, cache).await;
                Ok(Some(value))
            }
            (value, _) => Ok(value),
        }
    }

    pub async fn get_or<F, Fut>(
        key: CacheKey,
        cache: Option<&mut MultiplexedConnection>,
        callback: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let Some(cache) = cache else {
            return callback().await;
        };

        if let Some(value) = Self::lookup(&key, cache).await {
            return Ok(value);
        }

        let bind = Self::capture_bind(&key, cache).await;
        log::trace!("> Fetching {}", key);
        let value = callback().await?;
        if let Some(bind) = bind {
            Self::store(&key, value.clone(), bind, cache).await;
        }

        Ok(value)
    }
}

/// Bumps a generation. Failures are logged, not returned: the write it follows is already committed.
pub async fn invalidate_cache(lifetime: CacheLifetime, cache: Option<&mut MultiplexedConnection>) {
    if let Some(cache) = cache {
        if let Err(e) = lifetime.invalidate(cache).await {
            log::error!("> Failed to invalidate {lifetime:?}: {e}");
        }
    }
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), ServiceError> {
    let _: () = cache.set(key, value).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), ServiceError> {
    let _: () = cache.del(key).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, ServiceError> {
    let value: Option<V> = cache.get(key).await.map_err(CacheError::from)?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert_eq!(CacheKey::recipe(12).to_string(), "recipe-12");
        assert_eq!(CacheKey::tags().to_string(), "tags-all");
        assert_eq!(
            CacheKey::ingredients(Some("FlOur")).to_string(),
            "ingredients-flour"
        );
        assert_eq!(CacheKey::ingredients(None).to_string(), "ingredients-");
    }

    #[test]
    fn keys_bind_to_generations() {
        assert_eq!(CacheKey::recipe(1).lifetime(), CacheLifetime::BindRecipeCache);
        assert_eq!(CacheKey::tags().lifetime(), CacheLifetime::BindCatalogCache);
        assert_eq!(
            CacheKey::ingredients(None).lifetime(),
            CacheLifetime::BindCatalogCache
        );
        assert_eq!(CacheLifetime::BindRecipeCache.bind_key(), "recipe-cache-key");
        assert_eq!(CacheLifetime::BindCatalogCache.bind_key(), "catalog-cache-key");
    }

    #[tokio::test]
    async fn without_connection_reads_go_to_store() {
        let value = RedisValue::<Vec<i32>>::get_or(CacheKey::tags(), None, || async {
            Ok(vec![1, 2, 3])
        })
        .await
        .unwrap();
        assert_eq!(value, vec![1, 2, 3]);

        let missing = RedisValue::<i32>::get_or_optional(CacheKey::recipe(5), None, || async {
            Ok(None)
        })
        .await
        .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn values_loaded_across_an_invalidation_stay_stale() {
        let before = Some(String::from("generation-1"));
        let after = Some(String::from("generation-2"));

        // Bind captured, then the store read races with a committed write and its invalidation
        let stored = RedisValue::bound(vec![1], CacheLifetime::BindRecipeCache, before.clone());
        assert!(stored.is_current(&before));
        assert!(!stored.is_current(&after));

        // No generation written yet: the first invalidation retires unbound values too
        let unbound = RedisValue::bound(vec![1], CacheLifetime::BindRecipeCache, None);
        assert!(unbound.is_current(&None));
        assert!(!unbound.is_current(&after));
    }
}
