//! Database module.
//!
//! Provides SQLite storage with embedded migrations and the repository
//! contract the check engine is written against.

mod models;
mod repository;
mod store;

pub use models::*;
pub use repository::*;
pub use store::*;
