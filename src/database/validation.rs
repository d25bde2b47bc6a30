use std::collections::{BTreeSet, HashSet};

use crate::config::Limits;

use super::{
    error::ServiceError,
    form::{IngredientLine, NewTag, RecipeForm},
    schema::Id,
};

/// A recipe write that passed every check that needs no store access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRecipe {
    pub name: String,
    pub text: String,
    pub image: Option<String>,
    pub cooking_time: i32,
    pub tags: BTreeSet<Id>,
    pub ingredients: Vec<IngredientLine>,
}

impl ValidRecipe {
    pub fn ingredient_ids(&self) -> Vec<Id> {
        self.ingredients.iter().map(|line| line.id).collect()
    }
}

pub fn validate_recipe(
    form: RecipeForm,
    creating: bool,
    limits: &Limits,
) -> Result<ValidRecipe, ServiceError> {
    let name = form.name.trim().to_owned();
    if name.is_empty() {
        return Err(ServiceError::validation("name - required field"));
    }
    if name.chars().count() > limits.recipe_name_max_length {
        return Err(ServiceError::validation(format!(
            "name - at most {} characters",
            limits.recipe_name_max_length
        )));
    }
    if limits.recipe_name_forbidden.is_match(&name) {
        return Err(ServiceError::validation(
            "name - can't consist only of digits and symbols",
        ));
    }
    if form.text.trim().is_empty() {
        return Err(ServiceError::validation("text - required field"));
    }
    if form.cooking_time < limits.min_cooking_time {
        return Err(ServiceError::validation(format!(
            "cooking_time - must be at least {}",
            limits.min_cooking_time
        )));
    }

    let image = form.image.filter(|image| !image.trim().is_empty());
    if creating && image.is_none() {
        return Err(ServiceError::validation("image - required field"));
    }

    if form.tags.is_empty() {
        return Err(ServiceError::validation("tags - at least one tag is required"));
    }
    let tags: BTreeSet<Id> = form.tags.into_iter().collect();

    validate_ingredient_lines(&form.ingredients, limits)?;

    Ok(ValidRecipe {
        name,
        text: form.text,
        image,
        cooking_time: form.cooking_time,
        tags,
        ingredients: form.ingredients,
    })
}

pub fn validate_ingredient_lines(
    lines: &[IngredientLine],
    limits: &Limits,
) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::validation(
            "ingredients - at least one ingredient is required",
        ));
    }

    let mut seen = HashSet::with_capacity(lines.len());
    for line in lines {
        if !seen.insert(line.id) {
            return Err(ServiceError::DuplicateIngredient { id: line.id });
        }
    }

    // Checked after duplicates so a repeated id is reported regardless of amounts
    for line in lines {
        if line.amount < limits.min_amount || line.amount > limits.max_amount {
            return Err(ServiceError::InvalidAmount {
                id: line.id,
                amount: line.amount,
            });
        }
    }

    Ok(())
}

pub fn validate_tag(tag: &NewTag, limits: &Limits) -> Result<(), ServiceError> {
    if tag.name.trim().is_empty() || tag.name.chars().count() > limits.tag_name_max_length {
        return Err(ServiceError::validation(format!(
            "name - between 1 and {} characters",
            limits.tag_name_max_length
        )));
    }
    if !limits.tag_color.is_match(&tag.color) {
        return Err(ServiceError::validation(
            "color - must be a HEX color code, e.g. #E26C2D",
        ));
    }
    if tag.slug.chars().count() > limits.tag_slug_max_length || !limits.tag_slug.is_match(&tag.slug)
    {
        return Err(ServiceError::validation(
            "slug - letters, digits, '-' and '_' only",
        ));
    }
    Ok(())
}

pub fn validate_ingredient(
    name: &str,
    measurement_unit: &str,
    limits: &Limits,
) -> Result<(), ServiceError> {
    if name.trim().is_empty() || name.chars().count() > limits.ingredient_name_max_length {
        return Err(ServiceError::validation(format!(
            "Invalid ingredient name '{name}'"
        )));
    }
    if measurement_unit.trim().is_empty()
        || measurement_unit.chars().count() > limits.measurement_unit_max_length
    {
        return Err(ServiceError::validation(format!(
            "Invalid measurement unit '{measurement_unit}' for '{name}'"
        )));
    }
    Ok(())
}
