pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const SUBSCRIPTION_RECIPES_LIMIT: i64 = 3;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const RECIPE_NAME_MAX_LENGTH: usize = 200;
pub const TAG_NAME_MAX_LENGTH: usize = 200;
pub const TAG_SLUG_MAX_LENGTH: usize = 200;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 200;
pub const INGREDIENT_MEASUREMENT_UNIT_MAX_LENGTH: usize = 200;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MAX_INGREDIENT_AMOUNT: i32 = 32000;

/// Names made only of digits and punctuation are rejected.
pub const REGEX_RECIPE_NAME_FORBIDDEN: &str = r#"^[0-9!@#$%^&*()_+|~\-={}\[\]:";<>,.?/ ]*$"#;
pub const REGEX_TAG_COLOR: &str = r"^#[0-9A-Fa-f]{6}$";
pub const REGEX_TAG_SLUG: &str = r"^[-a-zA-Z0-9_]+$";

pub const SHOPPING_LIST_FILENAME: &str = "shopping-list.txt";

// Postgres caps bind parameters per statement at 65535
pub const MAX_BIND_PARAMETERS: usize = 65535;
