mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod pool;
    pub mod representation;
    pub mod schema;
    pub mod validation;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod shopping {
    pub mod aggregation;
    pub mod document;
    pub mod font;
}
mod config;
mod constants;
pub mod error;
mod reply;

pub use authentication::*;
pub use self::config::*;
pub use constants::*;
pub use database::*;
pub use database::error::{QueryError, TypeError};
pub use error::*;
pub use reply::*;
pub use shopping::*;
