//! Update handlers: commands, plain text links and menu callbacks

pub mod schema;
pub mod types;

pub use schema::schema;
pub use types::{HandlerDeps, HandlerError};
