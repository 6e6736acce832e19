pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const NAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;

pub const TAG_MAX_LENGTH: usize = 32;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 128;
pub const MEASUREMENT_UNIT_MAX_LENGTH: usize = 64;
pub const RECIPE_NAME_MAX_LENGTH: usize = 256;

/// Amounts and cooking times are stored as SMALLINT.
pub const SMALL_INT_MAX: i64 = i16::MAX as i64;

pub const SHORT_LINK_LENGTH: usize = 6;
pub const SHORT_LINK_ATTEMPTS: usize = 8;

pub const SESSION_EXPIRY_HOURS: i64 = 1;

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.pdf";
pub const SHOPPING_LIST_TITLE: &str = "Shopping list:";
