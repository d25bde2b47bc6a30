use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Id = i32;

#[derive(
    Clone, Copy, Debug, PartialEq, PartialOrd, sqlx::Type, Serialize, Eq, Ord, Hash, Deserialize,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

/// Public view of a user, as seen by `viewer`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserProfile {
    pub fn from_user(user: User, is_subscribed: bool) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRow {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: DateTime<Utc>,
}

/// Read shape of a recipe's ingredient: joined from `ingredients`, with the amount from the join row.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipeIngredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedRecipeTag {
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<LinkedRecipeTag> for Tag {
    fn from(value: LinkedRecipeTag) -> Self {
        Self {
            id: value.id,
            name: value.name,
            color: value.color,
            slug: value.slug,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedRecipeIngredient {
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<LinkedRecipeIngredient> for RecipeIngredient {
    fn from(value: LinkedRecipeIngredient) -> Self {
        Self {
            id: value.id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

/// Viewer-independent part of a recipe. This is what the read cache stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeCore {
    pub recipe: RecipeRow,
    pub author: User,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<RecipeIngredient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerFlags {
    pub is_subscribed: bool,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeDetail {
    pub fn from_core(core: RecipeCore, flags: ViewerFlags) -> Self {
        let RecipeCore {
            recipe,
            author,
            tags,
            ingredients,
        } = core;

        Self {
            id: recipe.id,
            tags,
            author: UserProfile::from_user(author, flags.is_subscribed),
            ingredients,
            is_favorited: flags.is_favorited,
            is_in_shopping_cart: flags.is_in_shopping_cart,
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
            pub_date: recipe.pub_date,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecipeShort {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedRecipeShort {
    pub author_id: Id,
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<LinkedRecipeShort> for RecipeShort {
    fn from(value: LinkedRecipeShort) -> Self {
        Self {
            id: value.id,
            name: value.name,
            image: value.image,
            cooking_time: value.cooking_time,
        }
    }
}

/// An author as listed in the follower's subscriptions.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCard {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}

impl SubscriptionCard {
    pub fn new(author: User, recipes: Vec<RecipeShort>, recipes_count: i64) -> Self {
        Self {
            email: author.email,
            id: author.id,
            username: author.username,
            first_name: author.first_name,
            last_name: author.last_name,
            is_subscribed: true,
            recipes,
            recipes_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> RecipeCore {
        RecipeCore {
            recipe: RecipeRow {
                id: 7,
                author_id: 2,
                name: String::from("Pancakes"),
                image: String::from("recipes/images/pancakes.png"),
                text: String::from("Mix and fry."),
                cooking_time: 20,
                pub_date: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            },
            author: User {
                id: 2,
                email: String::from("cook@example.com"),
                username: String::from("cook"),
                first_name: String::from("Ada"),
                last_name: String::from("Cook"),
                role: UserRole::User,
            },
            tags: vec![],
            ingredients: vec![RecipeIngredient {
                id: 1,
                name: String::from("flour"),
                measurement_unit: String::from("g"),
                amount: 200,
            }],
        }
    }

    #[test]
    fn detail_carries_viewer_flags() {
        let flags = ViewerFlags {
            is_subscribed: true,
            is_favorited: false,
            is_in_shopping_cart: true,
        };
        let detail = RecipeDetail::from_core(core(), flags);

        assert_eq!(detail.id, 7);
        assert!(detail.author.is_subscribed);
        assert!(!detail.is_favorited);
        assert!(detail.is_in_shopping_cart);
        assert_eq!(detail.ingredients[0].amount, 200);
    }

    #[test]
    fn detail_serializes_read_shape() {
        let detail = RecipeDetail::from_core(core(), ViewerFlags::default());
        let value = serde_json::to_value(&detail).unwrap();

        assert_eq!(value["author"]["username"], "cook");
        assert_eq!(value["ingredients"][0]["measurement_unit"], "g");
        assert!(value["author"].get("role").is_none());
    }
}
