pub mod manager;
pub mod memory;
pub mod postgres;
pub mod queries;
pub mod schema;
pub mod store;

pub use manager::{Backend, DatabaseError, DatabaseManager};
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
pub use store::{Database, Store, Transaction};
