pub mod ingredients;
pub mod lists;
pub mod recipes;
pub mod subscriptions;
pub mod tags;
pub mod users;

pub use ingredients::*;
pub use lists::*;
pub use recipes::*;
pub use subscriptions::*;
pub use tags::*;
pub use users::*;

use crate::error::{Error, ErrorKind};

/// Turns a no-op `ON CONFLICT DO NOTHING` insert or an unmatched delete into a
/// conflict carrying `message`.
pub(crate) fn conflict_unless_changed(rows_affected: u64, message: &str) -> Result<(), Error> {
    if rows_affected == 0 {
        return Err(ErrorKind::Conflict.new(message));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_rows_are_a_conflict() {
        let err = conflict_unless_changed(0, "Recipe is already in shopping cart").unwrap_err();

        assert!(err.is(ErrorKind::Conflict));
        assert_eq!(err.code, 400);
        assert_eq!(err.info.as_deref(), Some("Recipe is already in shopping cart"));
    }

    #[test]
    fn changed_rows_pass() {
        assert!(conflict_unless_changed(1, "You were not subscribed to this user").is_ok());
    }
}
