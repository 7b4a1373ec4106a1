pub mod sqlite;

pub use sqlite::SqliteResponseCache;
