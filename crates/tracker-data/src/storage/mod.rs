//! 저장소 구현.

pub mod postgres;

pub use postgres::{PgTrackerStore, TableNames};
