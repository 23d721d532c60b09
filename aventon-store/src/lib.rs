pub mod app_config;
pub mod archive;
pub mod database;

pub use app_config::Config;
pub use archive::{run_archiver, PgLedgerArchive};
pub use database::DbClient;
