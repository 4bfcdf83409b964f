//! SQLite persistence for the fact store, weight registry, computed records and the
//! audit chain. Functions take `&Connection` so they run unchanged inside a
//! `Transaction`.

pub mod audit;
pub mod facts;
pub mod runs;
pub mod schema;
pub mod scores;
pub mod weights;
#[cfg(test)]
mod tests;

pub use schema::{open_database, query_count};
#[cfg(test)]
pub use schema::open_in_memory;
