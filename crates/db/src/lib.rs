pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_from_config, connect_with_settings, ping, DbPool};
pub use fixtures::{LibrarySeed, SeedResult, VerificationResult};
pub use repositories::{
    BookRepository, ConversationRepository, OrderRepository, Repositories, RepositoryError,
};
