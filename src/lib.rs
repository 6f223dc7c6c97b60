pub mod api;
pub mod query;
pub mod sqlite_pragma;
pub mod sync;
