use std::collections::BTreeMap;

use serde::Serialize;

/// Field name to the messages raised against it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::Conflict => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InternalServerError => 500,
        }
    }

    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            code: self.code(),
            info: Some(info.to_string()),
            fields: None,
        }
    }

    pub fn default(self) -> Error {
        let info = match self {
            ErrorKind::InvalidRequest => "Invalid request",
            ErrorKind::Conflict => "Conflicting request",
            ErrorKind::Unauthorized => "Authentication credentials were not provided",
            ErrorKind::Forbidden => "You don't have permission to perform this action",
            ErrorKind::NotFound => "Not found",
            ErrorKind::InternalServerError => "Internal server error",
        };
        self.new(info)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{} ({code})", .info.as_deref().unwrap_or("unknown error"))]
pub struct Error {
    #[serde(skip)]
    pub kind: ErrorKind,
    pub code: u16,
    pub info: Option<String>,
    pub fields: Option<FieldErrors>,
}

impl Error {
    pub fn with_fields(mut self, fields: FieldErrors) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl warp::reject::Reject for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_status_codes() {
        assert_eq!(ErrorKind::InvalidRequest.default().code, 400);
        assert_eq!(ErrorKind::Conflict.new("Recipe is not in shopping cart").code, 400);
        assert_eq!(ErrorKind::Unauthorized.default().code, 401);
        assert_eq!(ErrorKind::Forbidden.default().code, 403);
        assert_eq!(ErrorKind::NotFound.default().code, 404);
        assert_eq!(ErrorKind::InternalServerError.default().code, 500);
    }

    #[test]
    fn display_includes_info_and_code() {
        let error = ErrorKind::NotFound.new("Recipe not found");
        assert_eq!(error.to_string(), "Recipe not found (404)");
        assert!(error.is(ErrorKind::NotFound));
    }
}
