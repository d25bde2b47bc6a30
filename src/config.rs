use std::{env, fmt::Display, str::FromStr};

use regex::Regex;

use crate::constants::{
    INGREDIENT_MEASUREMENT_UNIT_MAX_LENGTH, INGREDIENT_NAME_MAX_LENGTH, MAX_INGREDIENT_AMOUNT,
    MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT, RECIPE_COUNT_PER_PAGE, RECIPE_NAME_MAX_LENGTH,
    REGEX_RECIPE_NAME_FORBIDDEN, REGEX_TAG_COLOR, REGEX_TAG_SLUG, TAG_NAME_MAX_LENGTH,
    TAG_SLUG_MAX_LENGTH,
};

/// Validation limits shared by every write path. Built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Limits {
    pub recipe_name_max_length: usize,
    pub tag_name_max_length: usize,
    pub tag_slug_max_length: usize,
    pub ingredient_name_max_length: usize,
    pub measurement_unit_max_length: usize,

    pub min_cooking_time: i32,
    pub min_amount: i32,
    pub max_amount: i32,

    pub recipe_name_forbidden: Regex,
    pub tag_color: Regex,
    pub tag_slug: Regex,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            recipe_name_max_length: RECIPE_NAME_MAX_LENGTH,
            tag_name_max_length: TAG_NAME_MAX_LENGTH,
            tag_slug_max_length: TAG_SLUG_MAX_LENGTH,
            ingredient_name_max_length: INGREDIENT_NAME_MAX_LENGTH,
            measurement_unit_max_length: INGREDIENT_MEASUREMENT_UNIT_MAX_LENGTH,
            min_cooking_time: MIN_COOKING_TIME,
            min_amount: MIN_INGREDIENT_AMOUNT,
            max_amount: MAX_INGREDIENT_AMOUNT,
            recipe_name_forbidden: Regex::new(REGEX_RECIPE_NAME_FORBIDDEN)
                .expect("recipe name pattern is valid"),
            tag_color: Regex::new(REGEX_TAG_COLOR).expect("tag color pattern is valid"),
            tag_slug: Regex::new(REGEX_TAG_SLUG).expect("tag slug pattern is valid"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub page_size: i64,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::from("postgres://localhost/foodgram"),
            redis_url: None,
            page_size: RECIPE_COUNT_PER_PAGE,
            limits: Limits::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let limits = Limits {
            recipe_name_max_length: try_load(
                "RECIPE_NAME_MAX_LENGTH",
                defaults.limits.recipe_name_max_length,
            ),
            max_amount: try_load("MAX_INGREDIENT_AMOUNT", defaults.limits.max_amount),
            ..defaults.limits
        };

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| {
                log::info!("DATABASE_URL not set, using default: {}", defaults.database_url);
                defaults.database_url
            }),
            redis_url: env::var("REDIS_URL").ok(),
            page_size: try_load("PAGE_SIZE", defaults.page_size),
            limits,
        }
    }
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            log::warn!("Invalid {key} value: {e}, using default: {default}");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_constants() {
        let limits = Limits::default();
        assert_eq!(limits.min_amount, 1);
        assert_eq!(limits.max_amount, MAX_INGREDIENT_AMOUNT);
        assert!(limits.tag_color.is_match("#E26C2D"));
        assert!(!limits.tag_color.is_match("E26C2D"));
        assert!(!limits.tag_color.is_match("#E26C2"));
        assert!(limits.tag_slug.is_match("breakfast_2"));
        assert!(!limits.tag_slug.is_match("break fast"));
    }

    #[test]
    fn forbidden_name_pattern() {
        let limits = Limits::default();
        assert!(limits.recipe_name_forbidden.is_match("12345"));
        assert!(limits.recipe_name_forbidden.is_match("!!! ???"));
        assert!(!limits.recipe_name_forbidden.is_match("Pancakes 2"));
    }

    #[test]
    fn invalid_values_fall_back_to_default() {
        env::set_var("FOODGRAM_TEST_PAGE_SIZE", "many");
        assert_eq!(try_load("FOODGRAM_TEST_PAGE_SIZE", 6i64), 6);
        env::set_var("FOODGRAM_TEST_PAGE_SIZE", "12");
        assert_eq!(try_load("FOODGRAM_TEST_PAGE_SIZE", 6i64), 12);
        assert_eq!(try_load("FOODGRAM_TEST_UNSET_KEY", 3i32), 3);
    }
}
