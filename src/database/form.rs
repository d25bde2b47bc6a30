use serde::Deserialize;
use serde_json::Value;

use super::{error::ServiceError, schema::Id};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientLine {
    pub id: Id,
    pub amount: i32,
}

/// Write shape of a recipe: tag ids and (ingredient id, amount) lines.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeForm {
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    pub cooking_time: i32,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientLine>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    #[serde(default)]
    pub author: Option<Id>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_favorited: bool,
    #[serde(default)]
    pub is_in_shopping_cart: bool,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

pub fn from_value<T>(value: Value) -> Result<T, ServiceError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value).map_err(|e| ServiceError::validation(format!("Malformed payload: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn recipe_form_from_json() {
        let form: RecipeForm = from_value(json!({
            "name": "Pancakes",
            "text": "Mix and fry.",
            "cooking_time": 20,
            "tags": [1, 2],
            "ingredients": [{ "id": 4, "amount": 200 }],
        }))
        .unwrap();

        assert_eq!(form.image, None);
        assert_eq!(form.tags, vec![1, 2]);
        assert_eq!(form.ingredients, vec![IngredientLine { id: 4, amount: 200 }]);
    }

    #[test]
    fn missing_field_is_validation_error() {
        let result: Result<RecipeForm, _> = from_value(json!({ "name": "Pancakes" }));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn query_defaults() {
        let query: RecipeQuery = from_value(json!({ "tags": ["breakfast"] })).unwrap();
        assert_eq!(query.tags, vec![String::from("breakfast")]);
        assert!(!query.is_favorited);
        assert_eq!(query.limit, None);
        assert_eq!(query.offset, 0);
    }
}
