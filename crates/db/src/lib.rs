pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod store;

pub use connection::{connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedResult};
pub use store::SqlQuoteStore;
