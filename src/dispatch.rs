use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use warp::{http::StatusCode, Reply};

use crate::{
    actions::{
        add_favorite, add_to_cart, compose_recipe, create_tag, delete_recipe,
        download_shopping_list, get_ingredient, get_recipe_detail, get_tag, get_user_profile,
        import_ingredients, list_cart_recipes, list_ingredients, list_recipes,
        list_subscriptions, list_tags, remove_favorite, remove_from_cart,
        shopping_list_attachment, subscribe, unsubscribe, ComposeTarget,
    },
    config::Config,
    constants::SUBSCRIPTION_RECIPES_LIMIT,
    error::{CacheError, QueryError, ServiceError},
    form::{NewTag, RecipeForm, RecipeQuery},
    pagination::Page,
    schema::{
        Id, Ingredient, RecipeDetail, RecipeShort, SubscriptionCard, Tag, UserProfile,
    },
    session::{require_session, SessionData},
    shopping::Report,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Operation {
    ListTags,
    GetTag,
    CreateTag,
    ListIngredients,
    GetIngredient,
    ImportIngredients,
    ListRecipes,
    GetRecipe,
    CreateRecipe,
    UpdateRecipe,
    DeleteRecipe,
    AddFavorite,
    RemoveFavorite,
    AddToCart,
    RemoveFromCart,
    ListCart,
    DownloadShoppingList,
    GetUser,
    Subscribe,
    Unsubscribe,
    ListSubscriptions,
}

const ACCESS_TABLE: &[(Operation, Access)] = &[
    (Operation::ListTags, Access::Public),
    (Operation::GetTag, Access::Public),
    (Operation::CreateTag, Access::Authenticated),
    (Operation::ListIngredients, Access::Public),
    (Operation::GetIngredient, Access::Public),
    (Operation::ImportIngredients, Access::Authenticated),
    (Operation::ListRecipes, Access::Public),
    (Operation::GetRecipe, Access::Public),
    (Operation::CreateRecipe, Access::Authenticated),
    (Operation::UpdateRecipe, Access::Authenticated),
    (Operation::DeleteRecipe, Access::Authenticated),
    (Operation::AddFavorite, Access::Authenticated),
    (Operation::RemoveFavorite, Access::Authenticated),
    (Operation::AddToCart, Access::Authenticated),
    (Operation::RemoveFromCart, Access::Authenticated),
    (Operation::ListCart, Access::Authenticated),
    (Operation::DownloadShoppingList, Access::Authenticated),
    (Operation::GetUser, Access::Public),
    (Operation::Subscribe, Access::Authenticated),
    (Operation::Unsubscribe, Access::Authenticated),
    (Operation::ListSubscriptions, Access::Authenticated),
];

impl Operation {
    /// Operations missing from the table require a session.
    pub fn access(&self) -> Access {
        ACCESS_TABLE
            .iter()
            .find(|(operation, _)| operation == self)
            .map(|(_, access)| *access)
            .unwrap_or(Access::Authenticated)
    }
}

#[derive(Debug, Clone)]
pub enum Request {
    ListTags,
    GetTag(Id),
    CreateTag(NewTag),
    ListIngredients { search: Option<String> },
    GetIngredient(Id),
    /// Headerless `name,measurement_unit` rows.
    ImportIngredients { csv: String },
    ListRecipes(RecipeQuery),
    GetRecipe(Id),
    CreateRecipe(RecipeForm),
    UpdateRecipe { id: Id, form: RecipeForm },
    DeleteRecipe(Id),
    AddFavorite(Id),
    RemoveFavorite(Id),
    AddToCart(Id),
    RemoveFromCart(Id),
    ListCart,
    DownloadShoppingList,
    GetUser(Id),
    Subscribe {
        author_id: Id,
        recipes_limit: Option<i64>,
    },
    Unsubscribe(Id),
    ListSubscriptions {
        limit: Option<i64>,
        offset: i64,
        recipes_limit: Option<i64>,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::ListTags => Operation::ListTags,
            Request::GetTag(_) => Operation::GetTag,
            Request::CreateTag(_) => Operation::CreateTag,
            Request::ListIngredients { .. } => Operation::ListIngredients,
            Request::GetIngredient(_) => Operation::GetIngredient,
            Request::ImportIngredients { .. } => Operation::ImportIngredients,
            Request::ListRecipes(_) => Operation::ListRecipes,
            Request::GetRecipe(_) => Operation::GetRecipe,
            Request::CreateRecipe(_) => Operation::CreateRecipe,
            Request::UpdateRecipe { .. } => Operation::UpdateRecipe,
            Request::DeleteRecipe(_) => Operation::DeleteRecipe,
            Request::AddFavorite(_) => Operation::AddFavorite,
            Request::RemoveFavorite(_) => Operation::RemoveFavorite,
            Request::AddToCart(_) => Operation::AddToCart,
            Request::RemoveFromCart(_) => Operation::RemoveFromCart,
            Request::ListCart => Operation::ListCart,
            Request::DownloadShoppingList => Operation::DownloadShoppingList,
            Request::GetUser(_) => Operation::GetUser,
            Request::Subscribe { .. } => Operation::Subscribe,
            Request::Unsubscribe(_) => Operation::Unsubscribe,
            Request::ListSubscriptions { .. } => Operation::ListSubscriptions,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Response {
    Tags(Vec<Tag>),
    Tag(Tag),
    TagCreated(Tag),
    Ingredients(Vec<Ingredient>),
    Ingredient(Ingredient),
    IngredientsImported { inserted: u64 },
    Recipes(Page<RecipeDetail>),
    Recipe(RecipeDetail),
    RecipeCreated(RecipeDetail),
    RecipeLinked(RecipeShort),
    CartRecipes(Vec<RecipeShort>),
    ShoppingList(Report),
    User(UserProfile),
    SubscriptionCreated(SubscriptionCard),
    Subscriptions(Page<SubscriptionCard>),
    Deleted,
}

#[derive(Serialize)]
struct Imported {
    inserted: u64,
}

fn json_with_status<T: Serialize>(value: &T, status: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

impl Reply for Response {
    fn into_response(self) -> warp::reply::Response {
        match self {
            Response::Tags(tags) => json_with_status(&tags, StatusCode::OK),
            Response::Tag(tag) => json_with_status(&tag, StatusCode::OK),
            Response::TagCreated(tag) => json_with_status(&tag, StatusCode::CREATED),
            Response::Ingredients(ingredients) => json_with_status(&ingredients, StatusCode::OK),
            Response::Ingredient(ingredient) => json_with_status(&ingredient, StatusCode::OK),
            Response::IngredientsImported { inserted } => {
                json_with_status(&Imported { inserted }, StatusCode::CREATED)
            }
            Response::Recipes(page) => json_with_status(&page, StatusCode::OK),
            Response::Recipe(recipe) => json_with_status(&recipe, StatusCode::OK),
            Response::RecipeCreated(recipe) => json_with_status(&recipe, StatusCode::CREATED),
            Response::RecipeLinked(recipe) => json_with_status(&recipe, StatusCode::CREATED),
            Response::CartRecipes(recipes) => json_with_status(&recipes, StatusCode::OK),
            Response::ShoppingList(report) => shopping_list_attachment(&report),
            Response::User(user) => json_with_status(&user, StatusCode::OK),
            Response::SubscriptionCreated(card) => json_with_status(&card, StatusCode::CREATED),
            Response::Subscriptions(page) => json_with_status(&page, StatusCode::OK),
            Response::Deleted => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Shared handles for every dispatched request.
#[derive(Clone)]
pub struct Context {
    pub pool: PgPool,
    pub cache: Option<MultiplexedConnection>,
    pub config: Arc<Config>,
}

impl Context {
    pub async fn connect(config: Config) -> Result<Self, ServiceError> {
        let pool = PgPoolOptions::new()
            .connect(&config.database_url)
            .await
            .map_err(QueryError::from)?;

        let cache = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str()).map_err(CacheError::from)?;
                let connection = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(CacheError::from)?;
                Some(connection)
            }
            None => None,
        };

        Ok(Self {
            pool,
            cache,
            config: Arc::new(config),
        })
    }
}

pub async fn dispatch(
    ctx: &Context,
    session: Option<SessionData>,
    request: Request,
) -> Result<Response, ServiceError> {
    let operation = request.operation();
    if operation.access() == Access::Authenticated {
        require_session(session.as_ref())?;
    }
    log::trace!("> Dispatching {operation:?}");

    let pool = &ctx.pool;
    let limits = &ctx.config.limits;
    let page_size = ctx.config.page_size;
    let mut cache = ctx.cache.clone();
    let viewer = session.as_ref();

    let response = match request {
        Request::ListTags => Response::Tags(list_tags(pool, cache.as_mut()).await?),
        Request::GetTag(id) => Response::Tag(get_tag(id, pool).await?),
        Request::CreateTag(tag) => Response::TagCreated(
            create_tag(tag, require_session(viewer)?, limits, pool, cache.as_mut()).await?,
        ),
        Request::ListIngredients { search } => Response::Ingredients(
            list_ingredients(search.as_deref(), pool, cache.as_mut()).await?,
        ),
        Request::GetIngredient(id) => Response::Ingredient(get_ingredient(id, pool).await?),
        Request::ImportIngredients { csv } => Response::IngredientsImported {
            inserted: import_ingredients(
                csv.as_bytes(),
                require_session(viewer)?,
                limits,
                pool,
                cache.as_mut(),
            )
            .await?,
        },
        Request::ListRecipes(query) => {
            Response::Recipes(list_recipes(&query, viewer, page_size, pool).await?)
        }
        Request::GetRecipe(id) => {
            Response::Recipe(get_recipe_detail(id, viewer, pool, cache.as_mut()).await?)
        }
        Request::CreateRecipe(form) => Response::RecipeCreated(
            compose_recipe(
                ComposeTarget::Create,
                form,
                require_session(viewer)?,
                limits,
                pool,
                cache.as_mut(),
            )
            .await?,
        ),
        Request::UpdateRecipe { id, form } => Response::Recipe(
            compose_recipe(
                ComposeTarget::Update(id),
                form,
                require_session(viewer)?,
                limits,
                pool,
                cache.as_mut(),
            )
            .await?,
        ),
        Request::DeleteRecipe(id) => {
            delete_recipe(id, require_session(viewer)?, pool, cache.as_mut()).await?;
            Response::Deleted
        }
        Request::AddFavorite(id) => {
            Response::RecipeLinked(add_favorite(id, require_session(viewer)?, pool).await?)
        }
        Request::RemoveFavorite(id) => {
            remove_favorite(id, require_session(viewer)?, pool).await?;
            Response::Deleted
        }
        Request::AddToCart(id) => {
            Response::RecipeLinked(add_to_cart(id, require_session(viewer)?, pool).await?)
        }
        Request::RemoveFromCart(id) => {
            remove_from_cart(id, require_session(viewer)?, pool).await?;
            Response::Deleted
        }
        Request::ListCart => {
            Response::CartRecipes(list_cart_recipes(require_session(viewer)?, pool).await?)
        }
        Request::DownloadShoppingList => {
            Response::ShoppingList(download_shopping_list(require_session(viewer)?, pool).await?)
        }
        Request::GetUser(id) => Response::User(get_user_profile(id, viewer, pool).await?),
        Request::Subscribe {
            author_id,
            recipes_limit,
        } => Response::SubscriptionCreated(
            subscribe(
                author_id,
                recipes_limit.unwrap_or(SUBSCRIPTION_RECIPES_LIMIT),
                require_session(viewer)?,
                pool,
            )
            .await?,
        ),
        Request::Unsubscribe(author_id) => {
            unsubscribe(author_id, require_session(viewer)?, pool).await?;
            Response::Deleted
        }
        Request::ListSubscriptions {
            limit,
            offset,
            recipes_limit,
        } => Response::Subscriptions(
            list_subscriptions(
                limit,
                offset,
                recipes_limit.unwrap_or(SUBSCRIPTION_RECIPES_LIMIT),
                page_size,
                require_session(viewer)?,
                pool,
            )
            .await?,
        ),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        form::IngredientLine,
        schema::UserRole,
    };

    const ALL_OPERATIONS: &[Operation] = &[
        Operation::ListTags,
        Operation::GetTag,
        Operation::CreateTag,
        Operation::ListIngredients,
        Operation::GetIngredient,
        Operation::ImportIngredients,
        Operation::ListRecipes,
        Operation::GetRecipe,
        Operation::CreateRecipe,
        Operation::UpdateRecipe,
        Operation::DeleteRecipe,
        Operation::AddFavorite,
        Operation::RemoveFavorite,
        Operation::AddToCart,
        Operation::RemoveFromCart,
        Operation::ListCart,
        Operation::DownloadShoppingList,
        Operation::GetUser,
        Operation::Subscribe,
        Operation::Unsubscribe,
        Operation::ListSubscriptions,
    ];

    // Lazy pools never connect, so any store access would surface as a pool error.
    fn offline_context() -> Context {
        let config = Config::default();
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();

        Context {
            pool,
            cache: None,
            config: Arc::new(config),
        }
    }

    fn form() -> RecipeForm {
        RecipeForm {
            name: String::from("Pancakes"),
            text: String::from("Mix and fry."),
            image: Some(String::from("recipes/images/pancakes.png")),
            cooking_time: 20,
            tags: vec![1],
            ingredients: vec![IngredientLine { id: 1, amount: 200 }],
        }
    }

    fn user() -> SessionData {
        SessionData::new(7, "cook", UserRole::User)
    }

    #[test]
    fn every_operation_has_an_access_entry() {
        for operation in ALL_OPERATIONS {
            assert!(
                ACCESS_TABLE.iter().any(|(entry, _)| entry == operation),
                "{operation:?} is missing"
            );
        }
        assert_eq!(ACCESS_TABLE.len(), ALL_OPERATIONS.len());
    }

    #[test]
    fn reads_are_public_and_writes_are_not() {
        assert_eq!(Operation::ListRecipes.access(), Access::Public);
        assert_eq!(Operation::GetRecipe.access(), Access::Public);
        assert_eq!(Operation::CreateRecipe.access(), Access::Authenticated);
        assert_eq!(Operation::DownloadShoppingList.access(), Access::Authenticated);
        assert_eq!(
            Request::UpdateRecipe { id: 1, form: form() }.operation(),
            Operation::UpdateRecipe
        );
    }

    #[tokio::test]
    async fn anonymous_writes_are_unauthorized() {
        let ctx = offline_context();
        let requests = vec![
            Request::CreateRecipe(form()),
            Request::UpdateRecipe { id: 1, form: form() },
            Request::DeleteRecipe(1),
            Request::AddFavorite(1),
            Request::RemoveFromCart(1),
            Request::DownloadShoppingList,
            Request::Subscribe {
                author_id: 2,
                recipes_limit: None,
            },
        ];

        for request in requests {
            let error = dispatch(&ctx, None, request).await.unwrap_err();
            assert!(matches!(error, ServiceError::Unauthorized));
        }
    }

    #[tokio::test]
    async fn self_subscription_fails_before_the_store() {
        let ctx = offline_context();
        let error = dispatch(
            &ctx,
            Some(user()),
            Request::Subscribe {
                author_id: 7,
                recipes_limit: None,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn invalid_recipes_fail_before_the_store() {
        let ctx = offline_context();

        let mut duplicate = form();
        duplicate.ingredients.push(IngredientLine { id: 1, amount: 5 });
        let error = dispatch(&ctx, Some(user()), Request::CreateRecipe(duplicate))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::DuplicateIngredient { id: 1 }));

        let mut untagged = form();
        untagged.tags.clear();
        let error = dispatch(&ctx, Some(user()), Request::CreateRecipe(untagged))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn catalog_writes_need_admin() {
        let ctx = offline_context();
        let error = dispatch(
            &ctx,
            Some(user()),
            Request::ImportIngredients {
                csv: String::from("flour,g\n"),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(error, ServiceError::Forbidden));
    }

    #[test]
    fn response_statuses() {
        assert_eq!(Response::Deleted.into_response().status(), StatusCode::NO_CONTENT);
        assert_eq!(
            Response::IngredientsImported { inserted: 3 }
                .into_response()
                .status(),
            StatusCode::CREATED
        );
        assert_eq!(
            Response::Tags(vec![]).into_response().status(),
            StatusCode::OK
        );
    }
}
