pub mod operations;
pub mod schema;


pub use operations::{Database, Session, SessionSummary};
pub use schema::{initialize_schema, run_migrations};
