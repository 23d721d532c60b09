pub mod code;
pub mod error;
pub mod money;
pub mod repository;

pub use error::EngineError;
pub use money::Cents;
