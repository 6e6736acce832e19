use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::{
    error::TypeError,
    form::{number_from_value, Form},
    schema::Id,
};
use crate::{
    constants::{
        EMAIL_MAX_LENGTH, INGREDIENT_NAME_MAX_LENGTH, MEASUREMENT_UNIT_MAX_LENGTH,
        NAME_MAX_LENGTH, PASSWORD_MIN_LENGTH, RECIPE_NAME_MAX_LENGTH, SMALL_INT_MAX,
        TAG_MAX_LENGTH, USERNAME_MAX_LENGTH,
    },
    error::{Error, ErrorKind, FieldErrors},
};

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid username pattern"));
static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid slug pattern"));
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ValidationErrors {
    fields: FieldErrors,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.fields.get(field)
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for Error {
    fn from(value: ValidationErrors) -> Self {
        ErrorKind::InvalidRequest
            .new("Validation failed")
            .with_fields(value.fields)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeInput {
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i16,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInput {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInput {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientInput {
    pub name: String,
    pub measurement_unit: String,
}

fn required_text(
    form: &Form,
    field: &str,
    max_length: Option<usize>,
    errors: &mut ValidationErrors,
) -> String {
    match form.get_str(field) {
        Ok(value) => {
            let value = value.trim().to_string();
            if value.is_empty() {
                errors.add(field, "This field may not be blank");
            } else if let Some(max) = max_length {
                if value.chars().count() > max {
                    errors.add(
                        field,
                        &format!("Ensure this field has no more than {max} characters"),
                    );
                }
            }
            value
        }
        Err(e) => {
            errors.add(field, e.info());
            String::new()
        }
    }
}

fn positive_small_int(value: Result<i64, TypeError>) -> Result<i16, String> {
    match value {
        Ok(n) if n < 1 => Err(String::from("Ensure this value is greater than or equal to 1")),
        Ok(n) if n > SMALL_INT_MAX => Err(format!(
            "Ensure this value is less than or equal to {SMALL_INT_MAX}"
        )),
        Ok(n) => Ok(n as i16),
        Err(e) => Err(e.info().to_string()),
    }
}

fn validate_tag_ids(values: Vec<Value>, errors: &mut ValidationErrors) -> Vec<Id> {
    if values.is_empty() {
        errors.add("tags", "A recipe needs at least one tag");
        return vec![];
    }

    let mut seen = HashSet::new();
    let mut tags = Vec::with_capacity(values.len());
    for value in values {
        match number_from_value::<Id>(&value) {
            Ok(id) => {
                if !seen.insert(id) {
                    errors.add("tags", "Tags must not repeat");
                    continue;
                }
                tags.push(id);
            }
            Err(e) => errors.add("tags", e.info()),
        }
    }
    tags
}

fn validate_ingredient_amounts(
    values: Vec<Value>,
    errors: &mut ValidationErrors,
) -> Vec<IngredientAmount> {
    if values.is_empty() {
        errors.add("ingredients", "A recipe needs at least one ingredient");
        return vec![];
    }

    let mut seen = HashSet::new();
    let mut ingredients = Vec::with_capacity(values.len());
    for value in values {
        let item = match value {
            Value::Object(map) => Form::from_data(map.into_iter().collect()),
            _ => {
                errors.add("ingredients", "Each ingredient needs an id and an amount");
                continue;
            }
        };

        let id = match item.get_number::<Id>("id") {
            Ok(id) => id,
            Err(e) => {
                errors.add("ingredients", e.info());
                continue;
            }
        };
        let amount = match positive_small_int(item.get_number::<i64>("amount")) {
            Ok(amount) => amount,
            Err(message) => {
                errors.add("ingredients", &format!("Ingredient {id}: {message}"));
                continue;
            }
        };
        if !seen.insert(id) {
            errors.add("ingredients", "Ingredients must not repeat");
            continue;
        }

        ingredients.push(IngredientAmount { id, amount });
    }
    ingredients
}

/// Checks a recipe body for creation or full update. Existence of the
/// referenced tags and ingredients is checked against the store separately.
pub fn validate_recipe(form: &Form) -> Result<RecipeInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = required_text(form, "name", Some(RECIPE_NAME_MAX_LENGTH), &mut errors);
    let text = required_text(form, "text", None, &mut errors);
    let image = required_text(form, "image", None, &mut errors);

    let cooking_time = match positive_small_int(form.get_number::<i64>("cooking_time")) {
        Ok(value) => value,
        Err(message) => {
            errors.add("cooking_time", &message);
            0
        }
    };

    let tags = match form.get_list("tags") {
        Ok(values) => validate_tag_ids(values, &mut errors),
        Err(e) => {
            errors.add("tags", e.info());
            vec![]
        }
    };

    let ingredients = match form.get_list("ingredients") {
        Ok(values) => validate_ingredient_amounts(values, &mut errors),
        Err(e) => {
            errors.add("ingredients", e.info());
            vec![]
        }
    };

    errors.into_result(RecipeInput {
        name,
        text,
        image,
        cooking_time,
        tags,
        ingredients,
    })
}

pub fn validate_password(field: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.add(
            field,
            &format!("Ensure this field has at least {PASSWORD_MIN_LENGTH} characters"),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "This password is entirely numeric");
    }
    errors.into_result(())
}

pub fn validate_user(form: &Form) -> Result<UserInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let email = required_text(form, "email", Some(EMAIL_MAX_LENGTH), &mut errors);
    if !email.is_empty() && !EMAIL_PATTERN.is_match(&email) {
        errors.add("email", "Enter a valid email address");
    }

    let username = required_text(form, "username", Some(USERNAME_MAX_LENGTH), &mut errors);
    if !username.is_empty() && !USERNAME_PATTERN.is_match(&username) {
        errors.add(
            "username",
            "Username may contain only letters, digits and @/./+/-/_",
        );
    }

    let first_name = required_text(form, "first_name", Some(NAME_MAX_LENGTH), &mut errors);
    let last_name = required_text(form, "last_name", Some(NAME_MAX_LENGTH), &mut errors);

    let password = match form.get_str("password") {
        Ok(password) => {
            if let Err(password_errors) = validate_password("password", &password) {
                for (field, messages) in password_errors.fields {
                    messages.iter().for_each(|m| errors.add(&field, m));
                }
            }
            password
        }
        Err(e) => {
            errors.add("password", e.info());
            String::new()
        }
    };

    errors.into_result(UserInput {
        email: email.to_lowercase(),
        username,
        first_name,
        last_name,
        password,
    })
}

pub fn validate_tag(form: &Form) -> Result<TagInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = required_text(form, "name", Some(TAG_MAX_LENGTH), &mut errors);
    let slug = required_text(form, "slug", Some(TAG_MAX_LENGTH), &mut errors);
    if !slug.is_empty() && !SLUG_PATTERN.is_match(&slug) {
        errors.add(
            "slug",
            "Slug may contain only letters, digits, underscores or hyphens",
        );
    }

    errors.into_result(TagInput { name, slug })
}

pub fn validate_ingredient(form: &Form) -> Result<IngredientInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = required_text(form, "name", Some(INGREDIENT_NAME_MAX_LENGTH), &mut errors);
    let measurement_unit = required_text(
        form,
        "measurement_unit",
        Some(MEASUREMENT_UNIT_MAX_LENGTH),
        &mut errors,
    );

    errors.into_result(IngredientInput {
        name,
        measurement_unit,
    })
}

pub fn validate_subscription(follower_id: Id, author_id: Id) -> Result<(), ValidationErrors> {
    if follower_id == author_id {
        return Err(ValidationErrors::single(
            "author",
            "You cannot subscribe to yourself",
        ));
    }
    Ok(())
}
