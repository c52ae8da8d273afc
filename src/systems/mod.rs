mod bookkeeping;
mod migration;

pub use bookkeeping::BookkeepingSystem;
pub use migration::MigrationSystem;
