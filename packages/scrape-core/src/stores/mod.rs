//! Storage backends.

mod memory;

#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
