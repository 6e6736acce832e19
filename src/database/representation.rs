//! Wire shapes returned to API clients. Each entity has exactly one read
//! representation; tags and ingredients serialize straight from their rows.

use serde::Serialize;

use super::schema::{Id, Recipe, RecipePart, Tag, User};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRead {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserRead {
    pub fn from_user(user: &User, is_subscribed: bool) -> Self {
        Self {
            id: user.id,
            email: user.email.to_owned(),
            username: user.username.to_owned(),
            first_name: user.first_name.to_owned(),
            last_name: user.last_name.to_owned(),
            is_subscribed,
            avatar: user.avatar.to_owned(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredientRead {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i16,
}

impl From<RecipePart> for RecipeIngredientRead {
    fn from(part: RecipePart) -> Self {
        Self {
            id: part.ingredient_id,
            name: part.name,
            measurement_unit: part.measurement_unit,
            amount: part.amount,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeRead {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserRead,
    pub ingredients: Vec<RecipeIngredientRead>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i16,
}

/// Per-viewer flags attached to a recipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipeFlags {
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeRead {
    pub fn new(
        recipe: Recipe,
        author: UserRead,
        tags: Vec<Tag>,
        parts: Vec<RecipePart>,
        flags: RecipeFlags,
    ) -> Self {
        Self {
            id: recipe.id,
            tags,
            author,
            ingredients: parts.into_iter().map(RecipeIngredientRead::from).collect(),
            is_favorited: flags.is_favorited,
            is_in_shopping_cart: flags.is_in_shopping_cart,
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShortRecipe {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i16,
}

impl From<&Recipe> for ShortRecipe {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.to_owned(),
            image: recipe.image.to_owned(),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRead {
    #[serde(flatten)]
    pub author: UserRead,
    pub recipes: Vec<ShortRecipe>,
    pub recipes_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::UserRole;
    use chrono::Utc;
    use serde_json::json;

    fn user() -> User {
        User {
            id: 7,
            email: "cook@example.org".into(),
            username: "cook".into(),
            first_name: "Julia".into(),
            last_name: "Child".into(),
            password: "$argon2id$...".into(),
            avatar: None,
            role: UserRole::User,
        }
    }

    #[test]
    fn user_read_never_exposes_password() {
        let value = serde_json::to_value(UserRead::from_user(&user(), true)).unwrap();

        assert_eq!(value["username"], "cook");
        assert_eq!(value["is_subscribed"], true);
        assert!(value.get("password").is_none());
        assert!(value.get("role").is_none());
    }

    #[test]
    fn recipe_read_maps_parts_to_ingredient_lines() {
        let recipe = Recipe {
            id: 3,
            author_id: 7,
            name: "Omelette".into(),
            text: "Whisk.".into(),
            image: "recipes/omelette.png".into(),
            cooking_time: 5,
            created_at: Utc::now(),
        };
        let parts = vec![RecipePart {
            recipe_id: 3,
            ingredient_id: 12,
            name: "Egg".into(),
            measurement_unit: "pcs".into(),
            amount: 3,
        }];
        let tags = vec![Tag {
            id: 1,
            name: "Breakfast".into(),
            slug: "breakfast".into(),
        }];

        let read = RecipeRead::new(
            recipe,
            UserRead::from_user(&user(), false),
            tags,
            parts,
            RecipeFlags {
                is_favorited: true,
                is_in_shopping_cart: false,
            },
        );
        let value = serde_json::to_value(&read).unwrap();

        assert_eq!(
            value["ingredients"],
            json!([{ "id": 12, "name": "Egg", "measurement_unit": "pcs", "amount": 3 }])
        );
        assert_eq!(value["tags"][0]["slug"], "breakfast");
        assert_eq!(value["is_favorited"], true);
        assert_eq!(value["author"]["id"], 7);
    }

    #[test]
    fn subscription_read_flattens_author() {
        let read = SubscriptionRead {
            author: UserRead::from_user(&user(), true),
            recipes: vec![],
            recipes_count: 4,
        };
        let value = serde_json::to_value(&read).unwrap();

        assert_eq!(value["username"], "cook");
        assert_eq!(value["recipes_count"], 4);
    }
}
